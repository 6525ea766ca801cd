//! Reference collection
//!
//! Walks the persisted reference and collection properties of a bag of
//! objects and records every `(type, key)` they point at, by UID and by code
//! in the same pass.

use std::collections::{BTreeMap, BTreeSet};

use crate::object::{IdentifiableObject, PropertyValue};
use crate::schema::ObjectType;

use super::PreheatIdentifier;

/// `identifier -> type -> keys` for every referenced object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    refs: BTreeMap<PreheatIdentifier, BTreeMap<ObjectType, BTreeSet<String>>>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one key; empty keys are ignored.
    pub fn add(
        &mut self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
        key: impl Into<String>,
    ) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        self.refs
            .entry(identifier)
            .or_default()
            .entry(object_type)
            .or_default()
            .insert(key);
    }

    /// Record an object under both its UID and its code
    pub fn add_object(&mut self, object: &IdentifiableObject) {
        let object_type = object.object_type();
        self.add(PreheatIdentifier::Uid, object_type, object.uid.as_str());
        if let Some(code) = object.code() {
            self.add(PreheatIdentifier::Code, object_type, code);
        }
    }

    pub fn keys(
        &self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
    ) -> Option<&BTreeSet<String>> {
        self.refs.get(&identifier).and_then(|types| types.get(&object_type))
    }

    pub fn contains(
        &self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
        key: &str,
    ) -> bool {
        self.keys(identifier, object_type)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Every type referenced under any identifier
    pub fn object_types(&self) -> BTreeSet<ObjectType> {
        self.refs.values().flat_map(|types| types.keys().copied()).collect()
    }

    pub fn merge(&mut self, other: &ReferenceMap) {
        for (identifier, types) in &other.refs {
            for (object_type, keys) in types {
                for key in keys {
                    self.add(*identifier, *object_type, key.as_str());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refs.values().all(|types| types.values().all(BTreeSet::is_empty))
    }

    /// Total number of keys across all identifiers and types
    pub fn len(&self) -> usize {
        self.refs
            .values()
            .flat_map(|types| types.values())
            .map(BTreeSet::len)
            .sum()
    }
}

/// Collect references of a single object into `refs`
pub fn collect_object_references(object: &IdentifiableObject, refs: &mut ReferenceMap) {
    for property in object.object_type().reference_properties() {
        match object.properties.get(property.name) {
            Some(PropertyValue::Reference(target)) => refs.add_object(target),
            Some(PropertyValue::Collection(members)) => {
                for member in members {
                    refs.add_object(member);
                }
            }
            _ => {}
        }
    }
}

/// Collect references of a bag of (possibly heterogeneous) objects
pub fn collect_references<'a, I>(objects: I) -> ReferenceMap
where
    I: IntoIterator<Item = &'a IdentifiableObject>,
{
    let mut refs = ReferenceMap::new();
    for object in objects {
        collect_object_references(object, &mut refs);
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> IdentifiableObject {
        IdentifiableObject::new(ObjectType::DataElementGroup, "degroupAAAA")
            .with_name("Vitals")
            .with_collection(
                "members",
                vec![
                    IdentifiableObject::stub(ObjectType::DataElement, "deabcdefghA")
                        .with_code("DE_A"),
                    IdentifiableObject::stub(ObjectType::DataElement, "deabcdefghB"),
                ],
            )
            .with_reference("user", IdentifiableObject::stub(ObjectType::User, "userabcdefA"))
    }

    #[test]
    fn test_collects_uid_and_code_in_one_pass() {
        let refs = collect_references([&group()]);

        let uids = refs.keys(PreheatIdentifier::Uid, ObjectType::DataElement).unwrap();
        assert_eq!(uids.len(), 2);
        assert!(refs.contains(PreheatIdentifier::Code, ObjectType::DataElement, "DE_A"));
        assert!(refs.contains(PreheatIdentifier::Uid, ObjectType::User, "userabcdefA"));
        assert_eq!(refs.len(), 4);
    }

    #[test]
    fn test_skips_computed_and_scalar_properties() {
        let element = IdentifiableObject::new(ObjectType::DataElement, "deabcdefghA")
            .with_scalar("href", "http://localhost/api/dataElements/deabcdefghA")
            .with_collection(
                "dataElementGroups",
                vec![IdentifiableObject::stub(ObjectType::DataElementGroup, "degroupAAAA")],
            )
            .with_reference(
                "categoryCombo",
                IdentifiableObject::stub(ObjectType::CategoryCombo, "ccabcdefghA"),
            );

        let refs = collect_references([&element]);
        assert_eq!(refs.object_types(), BTreeSet::from([ObjectType::CategoryCombo]));
    }

    #[test]
    fn test_collection_is_idempotent() {
        let objects = vec![group(), group()];
        let first = collect_references(&objects);
        let second = collect_references(&objects);
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge() {
        let mut refs = ReferenceMap::new();
        assert!(refs.is_empty());
        let mut other = ReferenceMap::new();
        other.add(PreheatIdentifier::Uid, ObjectType::Program, "programAAAA");
        other.add(PreheatIdentifier::Uid, ObjectType::Program, "");
        refs.merge(&other);
        assert_eq!(refs.len(), 1);
    }
}
