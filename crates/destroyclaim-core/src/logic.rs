//! Condition expressions: a JSON-logic subset parsed into an AST
//!
//! The same tree walk serves dependency extraction ([`Expr::references`])
//! and evaluation ([`Expr::evaluate`]). Leaves are literals or `var`
//! references to element identifiers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "===" => Self::StrictEq,
            "!==" => Self::StrictNe,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return None,
        })
    }

    /// `<` and `<=` accept a third operand ("between").
    fn accepts(self, count: usize) -> bool {
        match self {
            Self::Lt | Self::Le => count == 2 || count == 3,
            _ => count == 2,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A parsed condition expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Expr {
    /// Scalars and non-operator objects, returned as-is.
    Literal(Value),
    List(Vec<Expr>),
    Var {
        name: String,
        default: Option<Box<Expr>>,
    },
    Not(Box<Expr>),
    Truthy(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    If(Vec<Expr>),
    Compare { op: CompareOp, args: Vec<Expr> },
}

/// Variable source for evaluation.
pub trait Bindings {
    fn resolve(&self, name: &str) -> Option<Value>;
}

impl Bindings for HashMap<String, bool> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).map(|b| Value::Bool(*b))
    }
}

impl Bindings for BTreeMap<String, bool> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).map(|b| Value::Bool(*b))
    }
}

impl Bindings for Value {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var {
            name: name.into(),
            default: None,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn and(args: Vec<Expr>) -> Self {
        Self::And(args)
    }

    pub fn or(args: Vec<Expr>) -> Self {
        Self::Or(args)
    }

    pub fn not(expr: Expr) -> Self {
        Self::Not(Box::new(expr))
    }

    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Self::List(
                items.iter().map(Self::parse).collect::<Result<_>>()?,
            )),
            Value::Object(map) if map.len() == 1 => match map.iter().next() {
                Some((op, args)) => Self::parse_operation(op, args),
                None => Ok(Self::Literal(value.clone())),
            },
            other => Ok(Self::Literal(other.clone())),
        }
    }

    fn parse_operation(op: &str, args: &Value) -> Result<Self> {
        if op == "var" {
            return Self::parse_var(args);
        }
        let mut operands = match args {
            Value::Array(items) => items.iter().map(Self::parse).collect::<Result<Vec<_>>>()?,
            single => vec![Self::parse(single)?],
        };

        match op {
            "!" | "!!" => {
                if operands.is_empty() {
                    return Err(Error::logic(format!("'{}' needs an operand", op)));
                }
                let first = Box::new(operands.swap_remove(0));
                Ok(if op == "!" { Self::Not(first) } else { Self::Truthy(first) })
            }
            "and" | "or" | "if" => {
                if operands.is_empty() {
                    return Err(Error::logic(format!("'{}' needs at least one operand", op)));
                }
                Ok(match op {
                    "and" => Self::And(operands),
                    "or" => Self::Or(operands),
                    _ => Self::If(operands),
                })
            }
            "xor" => {
                if operands.len() != 2 {
                    return Err(Error::logic("'xor' needs exactly two operands"));
                }
                let b = operands.pop().map(Box::new);
                let a = operands.pop().map(Box::new);
                match (a, b) {
                    (Some(a), Some(b)) => Ok(Self::Xor(a, b)),
                    _ => Err(Error::logic("'xor' needs exactly two operands")),
                }
            }
            other => match CompareOp::from_symbol(other) {
                Some(cmp) if cmp.accepts(operands.len()) => Ok(Self::Compare {
                    op: cmp,
                    args: operands,
                }),
                Some(cmp) => Err(Error::logic(format!(
                    "'{}' got {} operands",
                    cmp,
                    operands.len()
                ))),
                None => Err(Error::logic(format!("unknown operator '{}'", other))),
            },
        }
    }

    fn parse_var(args: &Value) -> Result<Self> {
        let (name, default) = match args {
            Value::Array(items) => {
                let name = items.first().cloned().unwrap_or(Value::Null);
                let default = items.get(1).map(Self::parse).transpose()?.map(Box::new);
                (name, default)
            }
            other => (other.clone(), None),
        };
        let name = match name {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            other => return Err(Error::logic(format!("invalid var name: {}", other))),
        };
        Ok(Self::Var { name, default })
    }

    /// Identifiers referenced by `var` leaves anywhere in the tree.
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Var { name, default } => {
                refs.insert(name.clone());
                if let Some(d) = default {
                    d.collect_references(refs);
                }
            }
            Self::Not(e) | Self::Truthy(e) => e.collect_references(refs),
            Self::Xor(a, b) => {
                a.collect_references(refs);
                b.collect_references(refs);
            }
            Self::List(args)
            | Self::And(args)
            | Self::Or(args)
            | Self::If(args)
            | Self::Compare { args, .. } => {
                for arg in args {
                    arg.collect_references(refs);
                }
            }
        }
    }

    pub fn evaluate(&self, data: &dyn Bindings) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::List(items) => Value::Array(items.iter().map(|e| e.evaluate(data)).collect()),
            Self::Var { name, default } => match data.resolve(name) {
                Some(v) if !v.is_null() => v,
                _ => default
                    .as_ref()
                    .map(|d| d.evaluate(data))
                    .unwrap_or(Value::Null),
            },
            Self::Not(e) => Value::Bool(!truthy(&e.evaluate(data))),
            Self::Truthy(e) => Value::Bool(truthy(&e.evaluate(data))),
            Self::And(args) => {
                let mut last = Value::Null;
                for arg in args {
                    last = arg.evaluate(data);
                    if !truthy(&last) {
                        return last;
                    }
                }
                last
            }
            Self::Or(args) => {
                let mut last = Value::Null;
                for arg in args {
                    last = arg.evaluate(data);
                    if truthy(&last) {
                        return last;
                    }
                }
                last
            }
            Self::Xor(a, b) => Value::Bool(truthy(&a.evaluate(data)) != truthy(&b.evaluate(data))),
            Self::If(args) => {
                let mut i = 0;
                while i + 1 < args.len() {
                    if truthy(&args[i].evaluate(data)) {
                        return args[i + 1].evaluate(data);
                    }
                    i += 2;
                }
                if i < args.len() {
                    args[i].evaluate(data)
                } else {
                    Value::Null
                }
            }
            Self::Compare { op, args } => {
                let values: Vec<Value> = args.iter().map(|a| a.evaluate(data)).collect();
                Value::Bool(compare(*op, &values))
            }
        }
    }

    pub fn evaluate_bool(&self, data: &dyn Bindings) -> bool {
        truthy(&self.evaluate(data))
    }

    pub fn to_value(&self) -> Value {
        fn op(name: &str, args: Vec<Value>) -> Value {
            let mut map = Map::new();
            map.insert(name.to_string(), Value::Array(args));
            Value::Object(map)
        }
        fn all(args: &[Expr]) -> Vec<Value> {
            args.iter().map(Expr::to_value).collect()
        }

        match self {
            Self::Literal(v) => v.clone(),
            Self::List(items) => Value::Array(all(items)),
            Self::Var { name, default: None } => {
                let mut map = Map::new();
                map.insert("var".into(), Value::String(name.clone()));
                Value::Object(map)
            }
            Self::Var {
                name,
                default: Some(d),
            } => op("var", vec![Value::String(name.clone()), d.to_value()]),
            Self::Not(e) => op("!", vec![e.to_value()]),
            Self::Truthy(e) => op("!!", vec![e.to_value()]),
            Self::And(args) => op("and", all(args)),
            Self::Or(args) => op("or", all(args)),
            Self::Xor(a, b) => op("xor", vec![a.to_value(), b.to_value()]),
            Self::If(args) => op("if", all(args)),
            Self::Compare { op: cmp, args } => op(cmp.symbol(), all(args)),
        }
    }
}

impl TryFrom<Value> for Expr {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Expr> for Value {
    fn from(expr: Expr) -> Self {
        expr.to_value()
    }
}

/// JSON-logic truthiness: `false`, `null`, `0`, `""` and `[]` are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a)?.partial_cmp(&to_number(b)?),
    }
}

fn compare(op: CompareOp, values: &[Value]) -> bool {
    if values.len() < 2 {
        return false;
    }
    let pair = |i: usize, accept: fn(Ordering) -> bool| {
        ordering(&values[i], &values[i + 1]).map(accept).unwrap_or(false)
    };
    match op {
        CompareOp::Eq => loose_eq(&values[0], &values[1]),
        CompareOp::Ne => !loose_eq(&values[0], &values[1]),
        CompareOp::StrictEq => strict_eq(&values[0], &values[1]),
        CompareOp::StrictNe => !strict_eq(&values[0], &values[1]),
        CompareOp::Gt => pair(0, |o| o == Ordering::Greater),
        CompareOp::Ge => pair(0, |o| o != Ordering::Less),
        CompareOp::Lt | CompareOp::Le => {
            let accept: fn(Ordering) -> bool = if op == CompareOp::Lt {
                |o| o == Ordering::Less
            } else {
                |o| o != Ordering::Greater
            };
            (0..values.len() - 1).all(|i| pair(i, accept))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn var_resolves_from_bindings() {
        let e = Expr::parse(&json!({"var": "a"})).unwrap();
        assert!(e.evaluate_bool(&ctx(&[("a", true)])));
        assert!(!e.evaluate_bool(&ctx(&[("a", false)])));
        assert!(!e.evaluate_bool(&ctx(&[])));
    }

    #[test]
    fn var_default_applies_when_missing() {
        let e = Expr::parse(&json!({"var": ["missing", true]})).unwrap();
        assert!(e.evaluate_bool(&ctx(&[])));
    }

    #[test]
    fn and_or_short_circuit_semantics() {
        let data = ctx(&[("a", true), ("b", false)]);
        let and = Expr::parse(&json!({"and": [{"var": "a"}, {"var": "b"}]})).unwrap();
        let or = Expr::parse(&json!({"or": [{"var": "b"}, {"var": "a"}]})).unwrap();
        assert_eq!(and.evaluate(&data), json!(false));
        assert_eq!(or.evaluate(&data), json!(true));
    }

    #[test]
    fn xor_uses_truthiness() {
        let e = Expr::parse(&json!({"xor": [true, 0]})).unwrap();
        assert!(e.evaluate_bool(&ctx(&[])));
        let e = Expr::parse(&json!({"xor": [true, 1]})).unwrap();
        assert!(!e.evaluate_bool(&ctx(&[])));
    }

    #[test]
    fn comparisons() {
        let empty = ctx(&[]);
        assert!(Expr::parse(&json!({"==": [1, "1"]})).unwrap().evaluate_bool(&empty));
        assert!(!Expr::parse(&json!({"===": [1, "1"]})).unwrap().evaluate_bool(&empty));
        assert!(Expr::parse(&json!({"<": [1, 2, 3]})).unwrap().evaluate_bool(&empty));
        assert!(!Expr::parse(&json!({"<": [1, 3, 2]})).unwrap().evaluate_bool(&empty));
        assert!(Expr::parse(&json!({">=": ["b", "a"]})).unwrap().evaluate_bool(&empty));
    }

    #[test]
    fn if_chain_picks_first_truthy_branch() {
        let e = Expr::parse(&json!({"if": [false, "x", {"var": "a"}, "y", "z"]})).unwrap();
        assert_eq!(e.evaluate(&ctx(&[("a", true)])), json!("y"));
        assert_eq!(e.evaluate(&ctx(&[("a", false)])), json!("z"));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = Expr::parse(&json!({"nope": [1]})).unwrap_err();
        assert!(err.to_string().contains("unknown operator"));
    }

    #[test]
    fn empty_object_is_a_truthy_literal() {
        let e = Expr::parse(&json!({})).unwrap();
        assert!(e.evaluate_bool(&ctx(&[])));
    }

    #[test]
    fn references_walk_nested_operands() {
        let e = Expr::parse(&json!({
            "and": [
                {"var": "a"},
                {"or": [{"var": "b"}, {"!": {"var": "a"}}]},
                {"==": [{"var": "c"}, true]}
            ]
        }))
        .unwrap();
        let refs: Vec<_> = e.references().into_iter().collect();
        assert_eq!(refs, vec!["a", "b", "c"]);
    }

    #[test]
    fn serde_keeps_json_shape() {
        let raw = json!({"or": [{"var": "a"}, {"var": "b"}]});
        let e: Expr = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&e).unwrap(), raw);
    }
}
