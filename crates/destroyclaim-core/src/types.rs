//! Claim document types
//!
//! The wire shape is camelCase JSON. Mode flags stay `Option<bool>` so strict
//! mode can tell an explicit `false` from a missing field.

use crate::error::{Error, Result};
use crate::logic::Expr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The four element kinds a claim is made of.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    DestroySubject,
    DestroyContact,
    DestroyCondition,
    DestroyAction,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DestroySubject => write!(f, "destroySubject"),
            Self::DestroyContact => write!(f, "destroyContact"),
            Self::DestroyCondition => write!(f, "destroyCondition"),
            Self::DestroyAction => write!(f, "destroyAction"),
        }
    }
}

/// Fields shared by every claim element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementBody {
    pub id: String,
    /// Registered extension name, e.g. `std:sha256`.
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Expr>,
}

impl ElementBody {
    pub fn new(id: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload,
            comment: None,
            conditions: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestroySubject {
    #[serde(flatten)]
    pub element: ElementBody,
    /// Id of the destroy action that processes this subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestroyContact {
    #[serde(flatten)]
    pub element: ElementBody,
    /// Ids this contact is responsible for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestroyCondition {
    #[serde(flatten)]
    pub element: ElementBody,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestroyAction {
    #[serde(flatten)]
    pub element: ElementBody,
}

/// A destroy claim as it travels on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDocument {
    pub id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_mode: Option<bool>,
    #[serde(default, alias = "optInMode", skip_serializing_if = "Option::is_none")]
    pub manual_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroy_reasons: Option<Vec<String>>,
    /// Root gating condition over element ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Expr>,
    #[serde(default)]
    pub destroy_subjects: Vec<DestroySubject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destroy_contacts: Vec<DestroyContact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destroy_conditions: Vec<DestroyCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destroy_actions: Vec<DestroyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Keys of the raw document that none of the fields above claim, as
    /// paths like `bogus` or `destroySubjects[0].bogus`.
    #[serde(skip)]
    pub unknown_fields: Vec<String>,
}

const CLAIM_FIELDS: &[&str] = &[
    "id",
    "isActive",
    "strictMode",
    "simulationMode",
    "manualMode",
    "optInMode",
    "notificationMode",
    "modelVersion",
    "specVersion",
    "title",
    "description",
    "keywords",
    "issued",
    "modified",
    "expires",
    "destroyReasons",
    "conditions",
    "destroySubjects",
    "destroyContacts",
    "destroyConditions",
    "destroyActions",
    "signature",
];

const ELEMENT_FIELDS: &[&str] = &["id", "name", "payload", "comment", "conditions"];

/// Keys of `value` outside the claim model, top level and per element.
fn unknown_fields(value: &Value) -> Vec<String> {
    let extra = |object: &serde_json::Map<String, Value>, known: &[&str], own: &[&str]| {
        object
            .keys()
            .filter(|k| !known.contains(&k.as_str()) && !own.contains(&k.as_str()))
            .cloned()
            .collect::<Vec<_>>()
    };

    let Some(root) = value.as_object() else {
        return Vec::new();
    };
    let mut unknown = extra(root, CLAIM_FIELDS, &[]);
    let lists: [(&str, &[&str]); 4] = [
        ("destroySubjects", &["action"]),
        ("destroyContacts", &["refs"]),
        ("destroyConditions", &[]),
        ("destroyActions", &[]),
    ];
    for (list, own) in lists {
        let elements = root.get(list).and_then(Value::as_array).into_iter().flatten();
        for (i, element) in elements.enumerate() {
            if let Some(object) = element.as_object() {
                unknown.extend(
                    extra(object, ELEMENT_FIELDS, own)
                        .into_iter()
                        .map(|k| format!("{}[{}].{}", list, i, k)),
                );
            }
        }
    }
    unknown
}

impl ClaimDocument {
    /// Deserialize a raw JSON claim. Shape errors surface as schema validation errors.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::invalid_argument(
                "destroy claim must be a JSON object",
            ));
        }
        let mut document = Self::deserialize(value).map_err(|e| {
            Error::schema_validation("destroy claim core schema not valid", vec![e.to_string()])
        })?;
        document.unknown_fields = unknown_fields(value);
        Ok(document)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn is_strict_mode(&self) -> bool {
        self.strict_mode.unwrap_or(false)
    }

    pub fn is_simulation_mode(&self) -> bool {
        self.simulation_mode.unwrap_or(false)
    }

    /// Manual and opt-in are the same flag.
    pub fn is_manual_mode(&self) -> bool {
        self.manual_mode.unwrap_or(false)
    }

    pub fn is_notification_mode(&self) -> bool {
        self.notification_mode.unwrap_or(false)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e < now).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn destroy_reasons(&self) -> &[String] {
        self.destroy_reasons.as_deref().unwrap_or(&[])
    }
}
