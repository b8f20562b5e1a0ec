//! Request payloads for add/change/attach checks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{AccessError, Result};
use crate::rbac::models::{Resource, ResourceId};

/// Proposed field values for a create or edit.
///
/// Related fields may hold an integer id, a numeric string, an embedded
/// object with an `id` key, or null. Already-loaded instances can be
/// attached with [`Payload::with_instance`] to skip the lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(flatten)]
    fields: Map<String, Value>,

    /// Source object of a copy; related fields are read from it instead.
    #[serde(skip)]
    reference: Option<Box<Resource>>,

    #[serde(skip)]
    instances: BTreeMap<String, Resource>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                ..Self::default()
            }),
            Value::Null => Ok(Self::default()),
            _ => Err(AccessError::validation("Payload must be a JSON object")),
        }
    }

    /// The payload used to check a copy of `source`.
    pub fn copy_of(source: &Resource) -> Self {
        Self {
            reference: Some(Box::new(source.clone())),
            ..Self::default()
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set a related field to an already-loaded instance.
    pub fn with_instance(mut self, field: impl Into<String>, instance: &Resource) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), Value::from(instance.id.0));
        self.instances.insert(field, instance.clone());
        self
    }

    pub fn reference_object(&self) -> Option<&Resource> {
        self.reference.as_deref()
    }

    pub fn is_copy(&self) -> bool {
        self.reference.is_some()
    }

    /// True when nothing was submitted.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.reference.is_none()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn instance(&self, field: &str) -> Option<&Resource> {
        self.instances.get(field)
    }

    /// Interpret a related field as a primary key.
    ///
    /// `Ok(None)` means the field is absent or null.
    pub fn related_id(&self, field: &str) -> Result<Option<ResourceId>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(value) => parse_related_id(field, value),
        }
    }

    /// Interpret a many-valued related field as a list of primary keys.
    pub fn related_ids(&self, field: &str) -> Result<Vec<ResourceId>> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|value| parse_related_id(field, value).transpose())
                .collect(),
            Some(_) => Err(AccessError::bad_related_data(field)),
        }
    }
}

fn parse_related_id(field: &str, value: &Value) -> Result<Option<ResourceId>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(|id| Some(ResourceId(id)))
            .ok_or_else(|| AccessError::bad_related_data(field)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(|id| Some(ResourceId(id)))
            .map_err(|_| AccessError::bad_related_data(field)),
        Value::Object(map) => match map.get("id") {
            Some(inner @ (Value::Number(_) | Value::String(_))) => parse_related_id(field, inner),
            _ => Err(AccessError::bad_related_data(field)),
        },
        _ => Err(AccessError::bad_related_data(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::models::ResourceType;
    use serde_json::json;

    #[test]
    fn test_related_id_shapes() {
        let payload = Payload::from_value(json!({
            "inventory": 4,
            "project": "12",
            "credential": {"id": 9, "name": "ssh"},
            "execution_environment": null,
        }))
        .unwrap();

        assert_eq!(payload.related_id("inventory").unwrap(), Some(ResourceId(4)));
        assert_eq!(payload.related_id("project").unwrap(), Some(ResourceId(12)));
        assert_eq!(payload.related_id("credential").unwrap(), Some(ResourceId(9)));
        assert_eq!(payload.related_id("execution_environment").unwrap(), None);
        assert_eq!(payload.related_id("missing").unwrap(), None);
    }

    #[test]
    fn test_related_id_rejects_bad_data() {
        let payload = Payload::new()
            .with("inventory", "not-a-number")
            .with("project", json!([1, 2]))
            .with("credential", -3)
            .with("organization", json!({"name": "no id"}));

        for field in ["inventory", "project", "credential", "organization"] {
            let err = payload.related_id(field).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
            assert_eq!(
                err.user_message(),
                format!("Bad data found in related field {}.", field)
            );
        }
    }

    #[test]
    fn test_related_ids() {
        let payload = Payload::new().with("credentials", json!([1, "2", null, {"id": 3}]));
        assert_eq!(
            payload.related_ids("credentials").unwrap(),
            vec![ResourceId(1), ResourceId(2), ResourceId(3)]
        );
        assert!(Payload::new().with("credentials", 5).related_ids("credentials").is_err());
    }

    #[test]
    fn test_copy_payload() {
        let source = Resource::new(ResourceType::JobTemplate, 1, "deploy");
        let payload = Payload::copy_of(&source);
        assert!(payload.is_copy());
        assert!(!payload.is_empty());
        assert_eq!(payload.reference_object().map(|r| r.id), Some(ResourceId(1)));
    }

    #[test]
    fn test_with_instance() {
        let inv = Resource::new(ResourceType::Inventory, 8, "prod");
        let payload = Payload::new().with_instance("inventory", &inv);
        assert_eq!(payload.related_id("inventory").unwrap(), Some(ResourceId(8)));
        assert_eq!(payload.instance("inventory").map(|r| r.name.as_str()), Some("prod"));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(Payload::from_value(json!([1])).is_err());
        assert!(Payload::from_value(Value::Null).unwrap().is_empty());
    }
}
