//! Preheat: the per-import index of resolved metadata
//!
//! A [`Preheat`] is built once per import by the [loader](loader), consulted
//! by the [connector](connector) and the tracker validation hooks, and
//! dropped when the import finishes.
//!
//! ```text
//! map: PreheatIdentifier ─► ObjectType ─► key ─► Arc<IdentifiableObject>
//! defaults: ObjectType ─► default object   (Category*, CategoryOptionCombo)
//! ```
//!
//! `put` is first-write-wins, `replace` overwrites. Default objects never
//! enter the generic map, and empty keys are never indexed.

pub mod collector;
pub mod connector;
pub mod identifier;
pub mod loader;

pub use collector::{collect_object_references, collect_references, ReferenceMap};
pub use connector::{connect_all, connect_references, ConnectSummary};
pub use identifier::PreheatIdentifier;
pub use loader::{PreheatMode, PreheatParams, PreheatService};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::object::IdentifiableObject;
use crate::period::{Period, PeriodType};
use crate::schema::ObjectType;

type Bucket = HashMap<String, Arc<IdentifiableObject>>;

/// value -> owning object uid
pub type ValueIndex = HashMap<String, String>;

#[derive(Debug, Default, Clone)]
pub struct Preheat {
    map: HashMap<PreheatIdentifier, HashMap<ObjectType, Bucket>>,
    defaults: HashMap<ObjectType, Arc<IdentifiableObject>>,

    /// type -> unique property -> value -> uid
    uniqueness_map: HashMap<ObjectType, HashMap<String, ValueIndex>>,
    /// type -> attribute uids that must be present
    mandatory_attributes: HashMap<ObjectType, BTreeSet<String>>,
    /// type -> attribute uids whose values must be unique
    unique_attributes: HashMap<ObjectType, BTreeSet<String>>,
    /// type -> attribute uid -> value -> uid
    unique_attribute_values: HashMap<ObjectType, HashMap<String, ValueIndex>>,

    period_map: HashMap<String, Period>,
    period_type_map: HashMap<String, PeriodType>,

    user: Option<Arc<IdentifiableObject>>,
}

impl Preheat {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Lookup ==========

    pub fn get(
        &self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
        key: &str,
    ) -> Option<&Arc<IdentifiableObject>> {
        identifier
            .effective_for(object_type)
            .strategies()
            .iter()
            .find_map(|strategy| {
                self.map
                    .get(strategy)
                    .and_then(|types| types.get(&object_type))
                    .and_then(|bucket| bucket.get(key))
            })
    }

    /// Look up the preheated counterpart of `object`, keyed by its concrete type.
    pub fn get_object(
        &self,
        identifier: PreheatIdentifier,
        object: &IdentifiableObject,
    ) -> Option<&Arc<IdentifiableObject>> {
        let object_type = object.object_type();
        identifier
            .effective_for(object_type)
            .strategies()
            .iter()
            .find_map(|&strategy| {
                let key = strategy.key_of(object)?;
                self.get(strategy, object_type, key)
            })
    }

    pub fn contains_key(
        &self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
        key: &str,
    ) -> bool {
        self.get(identifier, object_type, key).is_some()
    }

    /// All objects of a type in one index (`Auto` reads the UID index).
    pub fn all(
        &self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
    ) -> impl Iterator<Item = &Arc<IdentifiableObject>> {
        let strategy = identifier.effective_for(object_type).strategies()[0];
        self.map
            .get(&strategy)
            .and_then(|types| types.get(&object_type))
            .into_iter()
            .flat_map(|bucket| bucket.values())
    }

    // ========== Mutation ==========

    /// Insert unless the key is already present. Default objects are skipped.
    pub fn put(
        &mut self,
        identifier: PreheatIdentifier,
        object: impl Into<Arc<IdentifiableObject>>,
    ) -> &mut Self {
        self.insert(identifier, object.into(), false);
        self
    }

    /// Insert, overwriting any existing entry. Default objects are skipped.
    pub fn replace(
        &mut self,
        identifier: PreheatIdentifier,
        object: impl Into<Arc<IdentifiableObject>>,
    ) -> &mut Self {
        self.insert(identifier, object.into(), true);
        self
    }

    pub fn put_all<I>(&mut self, identifier: PreheatIdentifier, objects: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<IdentifiableObject>>,
    {
        for object in objects {
            let object = object.into();
            if self.is_default(&object) {
                continue;
            }
            self.insert(identifier, object, false);
        }
        self
    }

    pub fn replace_all<I>(&mut self, identifier: PreheatIdentifier, objects: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<IdentifiableObject>>,
    {
        for object in objects {
            let object = object.into();
            if self.is_default(&object) {
                continue;
            }
            self.insert(identifier, object, true);
        }
        self
    }

    fn insert(
        &mut self,
        identifier: PreheatIdentifier,
        object: Arc<IdentifiableObject>,
        overwrite: bool,
    ) {
        if self.is_default(&object) {
            return;
        }

        let object_type = object.object_type();
        let identifier = identifier.effective_for(object_type);

        for &strategy in identifier.strategies() {
            let Some(key) = strategy.key_of(&object) else {
                continue;
            };
            let bucket = self
                .map
                .entry(strategy)
                .or_default()
                .entry(object_type)
                .or_default();
            if overwrite {
                bucket.insert(key.to_string(), Arc::clone(&object));
            } else {
                bucket
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::clone(&object));
            }
        }

        // Authorization lookups query credentials directly, keyed by the owning user's UID.
        if object_type == ObjectType::User && !object.uid.is_empty() {
            if let Some(credentials) = object.reference("userCredentials") {
                let bucket = self
                    .map
                    .entry(PreheatIdentifier::Uid)
                    .or_default()
                    .entry(ObjectType::UserCredentials)
                    .or_default();
                if overwrite {
                    bucket.insert(object.uid.clone(), Arc::clone(credentials));
                } else {
                    bucket
                        .entry(object.uid.clone())
                        .or_insert_with(|| Arc::clone(credentials));
                }
            }
        }
    }

    pub fn remove(
        &mut self,
        identifier: PreheatIdentifier,
        object_type: ObjectType,
        key: &str,
    ) -> &mut Self {
        for strategy in identifier.effective_for(object_type).strategies() {
            if let Some(bucket) = self
                .map
                .get_mut(strategy)
                .and_then(|types| types.get_mut(&object_type))
            {
                bucket.remove(key);
            }
        }
        self
    }

    pub fn remove_object(
        &mut self,
        identifier: PreheatIdentifier,
        object: &IdentifiableObject,
    ) -> &mut Self {
        let object_type = object.object_type();
        for &strategy in identifier.effective_for(object_type).strategies() {
            if let Some(key) = strategy.key_of(object) {
                let key = key.to_string();
                self.remove(strategy, object_type, &key);
            }
        }
        self
    }

    // ========== Emptiness ==========

    pub fn is_empty(&self) -> bool {
        self.map
            .values()
            .all(|types| types.values().all(|bucket| bucket.is_empty()))
    }

    pub fn is_empty_identifier(&self, identifier: PreheatIdentifier) -> bool {
        identifier.strategies().iter().all(|strategy| {
            self.map
                .get(strategy)
                .map_or(true, |types| types.values().all(|bucket| bucket.is_empty()))
        })
    }

    pub fn is_empty_type(&self, identifier: PreheatIdentifier, object_type: ObjectType) -> bool {
        identifier
            .effective_for(object_type)
            .strategies()
            .iter()
            .all(|strategy| {
                self.map
                    .get(strategy)
                    .and_then(|types| types.get(&object_type))
                    .map_or(true, |bucket| bucket.is_empty())
            })
    }

    // ========== Defaults ==========

    pub fn set_default(&mut self, object: impl Into<Arc<IdentifiableObject>>) -> &mut Self {
        let object = object.into();
        if object.object_type().is_default_eligible() {
            self.defaults.insert(object.object_type(), object);
        }
        self
    }

    pub fn default_for(&self, object_type: ObjectType) -> Option<&Arc<IdentifiableObject>> {
        self.defaults.get(&object_type)
    }

    pub fn defaults(&self) -> &HashMap<ObjectType, Arc<IdentifiableObject>> {
        &self.defaults
    }

    /// Default-eligible runtime type whose UID matches the registered default
    pub fn is_default(&self, object: &IdentifiableObject) -> bool {
        object.object_type().is_default_eligible()
            && self
                .defaults
                .get(&object.object_type())
                .is_some_and(|default| default.uid == object.uid)
    }

    // ========== Auxiliary maps ==========

    pub fn uniqueness_map(&self) -> &HashMap<ObjectType, HashMap<String, ValueIndex>> {
        &self.uniqueness_map
    }

    pub fn uniqueness_map_mut(&mut self) -> &mut HashMap<ObjectType, HashMap<String, ValueIndex>> {
        &mut self.uniqueness_map
    }

    pub fn mandatory_attributes(&self, object_type: ObjectType) -> Option<&BTreeSet<String>> {
        self.mandatory_attributes.get(&object_type)
    }

    pub fn mandatory_attributes_mut(&mut self) -> &mut HashMap<ObjectType, BTreeSet<String>> {
        &mut self.mandatory_attributes
    }

    pub fn unique_attributes(&self, object_type: ObjectType) -> Option<&BTreeSet<String>> {
        self.unique_attributes.get(&object_type)
    }

    pub fn unique_attributes_mut(&mut self) -> &mut HashMap<ObjectType, BTreeSet<String>> {
        &mut self.unique_attributes
    }

    pub fn unique_attribute_values(
        &self,
        object_type: ObjectType,
    ) -> Option<&HashMap<String, ValueIndex>> {
        self.unique_attribute_values.get(&object_type)
    }

    pub fn unique_attribute_values_mut(
        &mut self,
    ) -> &mut HashMap<ObjectType, HashMap<String, ValueIndex>> {
        &mut self.unique_attribute_values
    }

    pub fn period(&self, iso: &str) -> Option<&Period> {
        self.period_map.get(iso)
    }

    pub fn put_period(&mut self, period: Period) -> &mut Self {
        self.period_map.entry(period.iso.clone()).or_insert(period);
        self
    }

    pub fn period_type(&self, name: &str) -> Option<PeriodType> {
        self.period_type_map.get(name).copied()
    }

    pub fn put_period_type(
        &mut self,
        name: impl Into<String>,
        period_type: PeriodType,
    ) -> &mut Self {
        self.period_type_map.entry(name.into()).or_insert(period_type);
        self
    }

    pub fn user(&self) -> Option<&Arc<IdentifiableObject>> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<Arc<IdentifiableObject>>) -> &mut Self {
        self.user = user;
        self
    }
}
