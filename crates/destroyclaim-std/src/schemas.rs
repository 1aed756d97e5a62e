//! Payload schemas of the standard extensions.

use serde_json::{json, Value};

pub fn sha256() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hash": { "type": "string", "pattern": "^[0-9a-fA-F]{64}$" }
        },
        "required": ["hash"]
    })
}

pub fn agent() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "email": { "type": "string" }
        },
        "required": ["name"]
    })
}

pub fn from_point_in_time() -> Value {
    json!({
        "type": "object",
        "properties": {
            "from": { "type": "string", "format": "date-time" }
        },
        "required": ["from"]
    })
}

pub fn in_time_interval() -> Value {
    json!({
        "type": "object",
        "properties": {
            "from": { "type": "string", "format": "date-time" },
            "to": { "type": "string", "format": "date-time" }
        },
        "required": ["from", "to"]
    })
}

pub fn destruction_level() -> Value {
    json!({
        "type": "object",
        "properties": {
            "destructionLevel": { "type": "string" }
        },
        "required": ["destructionLevel"]
    })
}
