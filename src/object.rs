//! Identifiable metadata objects
//!
//! An [`IdentifiableObject`] is a detached snapshot of one metadata entity.
//! Its reference-valued properties hold other objects behind `Arc`, which may
//! be *stubs* (only the identifying key populated) until the connector swaps
//! in the preheated instance.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PreheatError, Result};
use crate::schema::{ObjectType, PropertyKind};

/// Value of a single property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Value),
    Reference(Arc<IdentifiableObject>),
    Collection(Vec<Arc<IdentifiableObject>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiableObject {
    object_type: ObjectType,
    pub uid: String,
    pub code: Option<String>,
    pub name: Option<String>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl IdentifiableObject {
    pub fn new(object_type: ObjectType, uid: impl Into<String>) -> Self {
        Self {
            object_type,
            uid: uid.into(),
            code: None,
            name: None,
            properties: BTreeMap::new(),
        }
    }

    /// A stub reference carrying only its UID
    pub fn stub(object_type: ObjectType, uid: impl Into<String>) -> Self {
        Self::new(object_type, uid)
    }

    /// A stub reference carrying only its code
    pub fn stub_by_code(object_type: ObjectType, code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::new(object_type, String::new())
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_scalar(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_scalar(name, value);
        self
    }

    pub fn with_reference(mut self, name: &str, target: IdentifiableObject) -> Self {
        self.set_reference(name, target);
        self
    }

    pub fn with_collection(mut self, name: &str, members: Vec<IdentifiableObject>) -> Self {
        self.set_collection(name, members);
        self
    }

    /// Concrete runtime type of this object
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| !c.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True when the object carries nothing beyond its identifying key.
    pub fn is_stub(&self) -> bool {
        self.name.is_none() && self.properties.is_empty()
    }

    pub fn set_scalar(&mut self, name: &str, value: impl Into<Value>) {
        self.properties
            .insert(name.to_string(), PropertyValue::Scalar(value.into()));
    }

    pub fn set_reference(&mut self, name: &str, target: IdentifiableObject) {
        self.properties
            .insert(name.to_string(), PropertyValue::Reference(Arc::new(target)));
    }

    pub fn set_collection(&mut self, name: &str, members: Vec<IdentifiableObject>) {
        self.properties.insert(
            name.to_string(),
            PropertyValue::Collection(members.into_iter().map(Arc::new).collect()),
        );
    }

    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.properties.get(name) {
            Some(PropertyValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    pub fn str_value(&self, name: &str) -> Option<&str> {
        self.scalar(name).and_then(Value::as_str)
    }

    pub fn bool_value(&self, name: &str) -> Option<bool> {
        self.scalar(name).and_then(Value::as_bool)
    }

    pub fn i64_value(&self, name: &str) -> Option<i64> {
        self.scalar(name).and_then(Value::as_i64)
    }

    pub fn reference(&self, name: &str) -> Option<&Arc<IdentifiableObject>> {
        match self.properties.get(name) {
            Some(PropertyValue::Reference(r)) => Some(r),
            _ => None,
        }
    }

    pub fn collection(&self, name: &str) -> &[Arc<IdentifiableObject>] {
        match self.properties.get(name) {
            Some(PropertyValue::Collection(c)) => c,
            _ => &[],
        }
    }

    /// Parse an object of a known type from a metadata export document.
    ///
    /// Properties named in the type's descriptor table as references or
    /// collections are parsed recursively; everything else is kept as a scalar.
    pub fn from_json(object_type: ObjectType, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            PreheatError::invalid_object(object_type.name(), "expected a JSON object")
        })?;

        let uid = obj
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let code = obj.get("code").and_then(Value::as_str).map(String::from);
        if uid.is_empty() && code.as_deref().map_or(true, str::is_empty) {
            return Err(PreheatError::invalid_object(
                object_type.name(),
                "object has neither id nor code",
            ));
        }

        let mut object = Self {
            object_type,
            uid,
            code,
            name: obj.get("name").and_then(Value::as_str).map(String::from),
            properties: BTreeMap::new(),
        };

        for (key, val) in obj {
            if matches!(key.as_str(), "id" | "code" | "name") || val.is_null() {
                continue;
            }
            let kind = object_type
                .property(key)
                .map(|p| p.kind)
                .unwrap_or(PropertyKind::Scalar);
            let parsed = match kind {
                PropertyKind::Scalar => PropertyValue::Scalar(val.clone()),
                PropertyKind::Reference(target) => {
                    PropertyValue::Reference(Arc::new(Self::from_json(target, val)?))
                }
                PropertyKind::Collection(target) => {
                    let items = val.as_array().ok_or_else(|| {
                        PreheatError::invalid_object(
                            object_type.name(),
                            format!("property '{}' must be an array", key),
                        )
                    })?;
                    let members = items
                        .iter()
                        .map(|item| Self::from_json(target, item).map(Arc::new))
                        .collect::<Result<Vec<_>>>()?;
                    PropertyValue::Collection(members)
                }
            };
            object.properties.insert(key.clone(), parsed);
        }

        Ok(object)
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if !self.uid.is_empty() {
            obj.insert("id".into(), Value::String(self.uid.clone()));
        }
        if let Some(code) = &self.code {
            obj.insert("code".into(), Value::String(code.clone()));
        }
        if let Some(name) = &self.name {
            obj.insert("name".into(), Value::String(name.clone()));
        }
        for (key, value) in &self.properties {
            let json = match value {
                PropertyValue::Scalar(v) => v.clone(),
                PropertyValue::Reference(r) => r.to_json(),
                PropertyValue::Collection(c) => {
                    Value::Array(c.iter().map(|m| m.to_json()).collect())
                }
            };
            obj.insert(key.clone(), json);
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stub_detection() {
        let stub = IdentifiableObject::stub(ObjectType::DataElement, "deabcdefghA");
        assert!(stub.is_stub());

        let full = stub.clone().with_name("Weight");
        assert!(!full.is_stub());
    }

    #[test]
    fn test_empty_code_is_no_code() {
        let de = IdentifiableObject::new(ObjectType::DataElement, "deabcdefghA").with_code("");
        assert_eq!(de.code(), None);
    }

    #[test]
    fn test_from_json_follows_descriptor_table() {
        let value = json!({
            "id": "degroupAAAA",
            "name": "Vitals",
            "shortName": "Vitals",
            "members": [{ "id": "deabcdefghA" }, { "id": "deabcdefghB" }],
            "user": { "id": "userabcdefA" }
        });
        let group = IdentifiableObject::from_json(ObjectType::DataElementGroup, &value).unwrap();

        assert_eq!(group.name(), Some("Vitals"));
        assert_eq!(group.str_value("shortName"), Some("Vitals"));
        assert_eq!(group.collection("members").len(), 2);
        assert_eq!(group.collection("members")[0].object_type(), ObjectType::DataElement);
        assert!(group.collection("members")[0].is_stub());
        assert_eq!(group.reference("user").unwrap().object_type(), ObjectType::User);
    }

    #[test]
    fn test_from_json_requires_identifier() {
        let err = IdentifiableObject::from_json(ObjectType::DataElement, &json!({ "name": "x" }));
        assert!(err.is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_structure() {
        let value = json!({
            "id": "programAAAA",
            "code": "ANC",
            "programType": "WITH_REGISTRATION",
            "categoryCombo": { "id": "ccdefaultAA" }
        });
        let program = IdentifiableObject::from_json(ObjectType::Program, &value).unwrap();
        assert_eq!(program.to_json(), value);
    }
}
