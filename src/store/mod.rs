//! Backing object stores
//!
//! The preheat loader only talks to storage through [`ObjectStore`], in a
//! handful of batched calls per object type. Stores hand back detached
//! snapshots; nothing in a `Preheat` points back into the store.

pub mod json;

pub use json::{load_directory, load_document};

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::object::IdentifiableObject;
use crate::schema::ObjectType;

/// Name carried by the system default of each default-eligible type
pub const DEFAULT_NAME: &str = "default";

pub trait ObjectStore {
    fn fetch_by_uid(
        &self,
        object_type: ObjectType,
        uids: &BTreeSet<String>,
    ) -> Result<Vec<IdentifiableObject>>;

    fn fetch_by_code(
        &self,
        object_type: ObjectType,
        codes: &BTreeSet<String>,
    ) -> Result<Vec<IdentifiableObject>>;

    fn fetch_all(&self, object_type: ObjectType) -> Result<Vec<IdentifiableObject>>;

    /// The system default instance of a default-eligible type, if one exists
    fn fetch_default(&self, object_type: ObjectType) -> Result<Option<IdentifiableObject>>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn fetch_by_uid(
        &self,
        object_type: ObjectType,
        uids: &BTreeSet<String>,
    ) -> Result<Vec<IdentifiableObject>> {
        (**self).fetch_by_uid(object_type, uids)
    }

    fn fetch_by_code(
        &self,
        object_type: ObjectType,
        codes: &BTreeSet<String>,
    ) -> Result<Vec<IdentifiableObject>> {
        (**self).fetch_by_code(object_type, codes)
    }

    fn fetch_all(&self, object_type: ObjectType) -> Result<Vec<IdentifiableObject>> {
        (**self).fetch_all(object_type)
    }

    fn fetch_default(&self, object_type: ObjectType) -> Result<Option<IdentifiableObject>> {
        (**self).fetch_default(object_type)
    }
}

/// Store backed by plain vectors per type; used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: BTreeMap<ObjectType, Vec<IdentifiableObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: IdentifiableObject) -> &mut Self {
        self.objects.entry(object.object_type()).or_default().push(object);
        self
    }

    /// Store holding every metadata document below `dir`
    pub fn from_directory(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        load_directory(dir.as_ref())
    }

    pub fn with(mut self, object: IdentifiableObject) -> Self {
        self.insert(object);
        self
    }

    pub fn extend(&mut self, objects: impl IntoIterator<Item = IdentifiableObject>) -> &mut Self {
        for object in objects {
            self.insert(object);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn of_type(&self, object_type: ObjectType) -> impl Iterator<Item = &IdentifiableObject> {
        self.objects.get(&object_type).into_iter().flatten()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn fetch_by_uid(
        &self,
        object_type: ObjectType,
        uids: &BTreeSet<String>,
    ) -> Result<Vec<IdentifiableObject>> {
        Ok(self
            .of_type(object_type)
            .filter(|o| uids.contains(&o.uid))
            .cloned()
            .collect())
    }

    fn fetch_by_code(
        &self,
        object_type: ObjectType,
        codes: &BTreeSet<String>,
    ) -> Result<Vec<IdentifiableObject>> {
        Ok(self
            .of_type(object_type)
            .filter(|o| o.code().is_some_and(|c| codes.contains(c)))
            .cloned()
            .collect())
    }

    fn fetch_all(&self, object_type: ObjectType) -> Result<Vec<IdentifiableObject>> {
        Ok(self.of_type(object_type).cloned().collect())
    }

    fn fetch_default(&self, object_type: ObjectType) -> Result<Option<IdentifiableObject>> {
        if !object_type.is_default_eligible() {
            return Ok(None);
        }
        Ok(self
            .of_type(object_type)
            .find(|o| o.name() == Some(DEFAULT_NAME))
            .cloned())
    }
}
