//! Reference and graph utilities over a claim's condition expressions

use crate::logic::Expr;
use crate::types::{ClaimDocument, ElementBody, ElementKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One element of a claim, tagged with its kind.
#[derive(Clone, Copy, Debug)]
pub struct IndexedElement<'a> {
    pub kind: ElementKind,
    pub element: &'a ElementBody,
}

/// Which identifiers [`id_universe`] returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdSelector {
    /// Every element id plus the claim's own id.
    All,
    Subjects,
    Contacts,
    Conditions,
    Actions,
}

/// Identifiers appearing as `var` leaves anywhere in `expr`.
pub fn referenced_ids(expr: &Expr) -> BTreeSet<String> {
    expr.references()
}

/// Subjects, contacts, conditions, then actions, each in document order.
pub fn flat_index(claim: &ClaimDocument) -> Vec<IndexedElement<'_>> {
    let subjects = claim.destroy_subjects.iter().map(|s| IndexedElement {
        kind: ElementKind::DestroySubject,
        element: &s.element,
    });
    let contacts = claim.destroy_contacts.iter().map(|c| IndexedElement {
        kind: ElementKind::DestroyContact,
        element: &c.element,
    });
    let conditions = claim.destroy_conditions.iter().map(|c| IndexedElement {
        kind: ElementKind::DestroyCondition,
        element: &c.element,
    });
    let actions = claim.destroy_actions.iter().map(|a| IndexedElement {
        kind: ElementKind::DestroyAction,
        element: &a.element,
    });
    subjects.chain(contacts).chain(conditions).chain(actions).collect()
}

pub fn id_universe(claim: &ClaimDocument, selector: IdSelector) -> BTreeSet<String> {
    let kind = match selector {
        IdSelector::All => {
            let mut ids: BTreeSet<String> = flat_index(claim)
                .into_iter()
                .map(|e| e.element.id.clone())
                .collect();
            ids.insert(claim.id.clone());
            return ids;
        }
        IdSelector::Subjects => ElementKind::DestroySubject,
        IdSelector::Contacts => ElementKind::DestroyContact,
        IdSelector::Conditions => ElementKind::DestroyCondition,
        IdSelector::Actions => ElementKind::DestroyAction,
    };
    flat_index(claim)
        .into_iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.element.id.clone())
        .collect()
}

/// Directed graph: element id → ids referenced by its own conditions.
/// Every element is a node; the root joins only when it carries conditions.
/// Self-edges are dropped here and reported by the self-reference check instead.
pub fn condition_graph(claim: &ClaimDocument) -> BTreeMap<String, BTreeSet<String>> {
    let edges = |id: &str, expr: Option<&Expr>| -> BTreeSet<String> {
        expr.map(|e| {
            e.references()
                .into_iter()
                .filter(|r| r != id)
                .collect()
        })
        .unwrap_or_default()
    };

    let mut graph: BTreeMap<String, BTreeSet<String>> = flat_index(claim)
        .into_iter()
        .map(|e| {
            (
                e.element.id.clone(),
                edges(&e.element.id, e.element.conditions.as_ref()),
            )
        })
        .collect();
    if let Some(root) = &claim.conditions {
        graph.insert(claim.id.clone(), edges(&claim.id, Some(root)));
    }
    graph
}

/// Every elementary cycle of the claim's condition graph. Non-empty means deadlock.
pub fn detect_cycles(claim: &ClaimDocument) -> Vec<Vec<String>> {
    find_cycles(&condition_graph(claim))
}

/// Enumerates elementary cycles, each reported once, starting at its
/// lowest-ordered node.
///
/// Johnson's circuit search, run only inside strongly connected components,
/// so a graph without cycles costs one linear Tarjan pass.
pub fn find_cycles(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    let nodes: Vec<&str> = graph.keys().map(String::as_str).collect();
    let position: HashMap<&str, usize> =
        nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let adj: Vec<Vec<usize>> = graph
        .values()
        .map(|targets| {
            targets
                .iter()
                .filter_map(|t| position.get(t.as_str()).copied())
                .collect()
        })
        .collect();

    let all: Vec<usize> = (0..nodes.len()).collect();
    let global = components(&adj, &all, |_| true);
    let mut sizes = vec![0usize; nodes.len()];
    for comp in global.iter().flatten() {
        sizes[*comp] += 1;
    }

    let mut cycles = Vec::new();
    for start in 0..nodes.len() {
        let self_loop = adj[start].contains(&start);
        let Some(comp) = global[start] else {
            continue;
        };
        if sizes[comp] < 2 && !self_loop {
            continue;
        }
        let local = components(&adj, &[start], |n| n >= start && global[n] == Some(comp));
        let scope: Vec<bool> = local.iter().map(|c| c.is_some() && *c == local[start]).collect();
        if scope.iter().filter(|in_scope| **in_scope).count() < 2 && !self_loop {
            continue;
        }

        let mut search = Circuits {
            adj: &adj,
            start,
            scope,
            blocked: vec![false; nodes.len()],
            blocked_by: vec![BTreeSet::new(); nodes.len()],
            path: Vec::new(),
            found: Vec::new(),
        };
        search.circuit(start);
        cycles.extend(
            search
                .found
                .into_iter()
                .map(|cycle| cycle.into_iter().map(|n| nodes[n].to_string()).collect()),
        );
    }
    cycles
}

/// Tarjan's strongly connected components over the nodes `allowed` admits,
/// searching from `roots`. Unreached nodes map to `None`.
fn components(
    adj: &[Vec<usize>],
    roots: &[usize],
    allowed: impl Fn(usize) -> bool,
) -> Vec<Option<usize>> {
    let mut tarjan = Tarjan {
        adj,
        allowed: &allowed,
        index: vec![None; adj.len()],
        low: vec![0; adj.len()],
        on_stack: vec![false; adj.len()],
        stack: Vec::new(),
        next: 0,
        component: vec![None; adj.len()],
        count: 0,
    };
    for &root in roots {
        if tarjan.index[root].is_none() && allowed(root) {
            tarjan.connect(root);
        }
    }
    tarjan.component
}

struct Tarjan<'g> {
    adj: &'g [Vec<usize>],
    allowed: &'g dyn Fn(usize) -> bool,
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    component: Vec<Option<usize>>,
    count: usize,
}

impl Tarjan<'_> {
    fn connect(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let adj = self.adj;
        for &w in &adj[v] {
            if !(self.allowed)(w) {
                continue;
            }
            match self.index[w] {
                None => {
                    self.connect(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(iw) if self.on_stack[w] => self.low[v] = self.low[v].min(iw),
                Some(_) => {}
            }
        }

        if self.index[v] == Some(self.low[v]) {
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                self.component[w] = Some(self.count);
                if w == v {
                    break;
                }
            }
            self.count += 1;
        }
    }
}

/// Johnson's blocked-set search for circuits through `start` within `scope`.
struct Circuits<'g> {
    adj: &'g [Vec<usize>],
    start: usize,
    scope: Vec<bool>,
    blocked: Vec<bool>,
    blocked_by: Vec<BTreeSet<usize>>,
    path: Vec<usize>,
    found: Vec<Vec<usize>>,
}

impl Circuits<'_> {
    fn circuit(&mut self, v: usize) -> bool {
        let mut closed = false;
        self.path.push(v);
        self.blocked[v] = true;

        let adj = self.adj;
        for &w in &adj[v] {
            if !self.scope[w] && w != self.start {
                continue;
            }
            if w == self.start {
                self.found.push(self.path.clone());
                closed = true;
            } else if !self.blocked[w] && self.circuit(w) {
                closed = true;
            }
        }

        if closed {
            self.unblock(v);
        } else {
            for &w in &adj[v] {
                if self.scope[w] {
                    self.blocked_by[w].insert(v);
                }
            }
        }
        self.path.pop();
        closed
    }

    fn unblock(&mut self, v: usize) {
        self.blocked[v] = false;
        for w in std::mem::take(&mut self.blocked_by[v]) {
            if self.blocked[w] {
                self.unblock(w);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        edges
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(find_cycles(&g).is_empty());
    }

    #[test]
    fn two_node_cycle_reported_once() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(find_cycles(&g), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn overlapping_cycles_are_all_found() {
        let g = graph(&[("a", &["b"]), ("b", &["a", "c"]), ("c", &["a"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&vec!["a".to_string(), "b".to_string()]));
        assert!(cycles.contains(&vec!["a".to_string(), "b".to_string(), "c".to_string()]));
    }

    #[test]
    fn edges_to_unknown_nodes_are_ignored() {
        let g = graph(&[("a", &["ghost"])]);
        assert!(find_cycles(&g).is_empty());
    }
}
