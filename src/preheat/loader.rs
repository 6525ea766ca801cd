//! Preheat loading
//!
//! Builds a [`Preheat`] for one import request, either from everything of a
//! set of types (`All`) or from only what a bag of objects references
//! (`Reference`). Storage is hit with one batched fetch per type and key
//! strategy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PreheatError, Result};
use crate::object::IdentifiableObject;
use crate::period::{IsoPeriodResolver, PeriodResolver};
use crate::schema::ObjectType;
use crate::store::ObjectStore;

use super::{collect_references, Preheat, PreheatIdentifier, ReferenceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PreheatMode {
    /// Preheat every persisted object of the requested classes
    All,
    /// Preheat only what the supplied objects reference, plus the objects themselves
    #[default]
    Reference,
}

/// One preheat request
#[derive(Debug, Clone, Default)]
pub struct PreheatParams {
    pub mode: PreheatMode,
    pub identifier: PreheatIdentifier,
    /// Acting user for the import
    pub user: Option<IdentifiableObject>,
    /// Top-level objects being imported (`Reference` mode)
    pub objects: Vec<IdentifiableObject>,
    /// Types to load in full
    pub classes: BTreeSet<ObjectType>,
    /// Extra references to resolve, e.g. those of a tracker bundle
    pub references: ReferenceMap,
    /// ISO period strings to resolve up front
    pub periods: BTreeSet<String>,
}

impl PreheatParams {
    pub fn new(mode: PreheatMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_identifier(mut self, identifier: PreheatIdentifier) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn with_user(mut self, user: IdentifiableObject) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_objects(mut self, objects: impl IntoIterator<Item = IdentifiableObject>) -> Self {
        self.objects.extend(objects);
        self
    }

    pub fn with_classes(mut self, classes: impl IntoIterator<Item = ObjectType>) -> Self {
        self.classes.extend(classes);
        self
    }

    pub fn with_references(mut self, references: ReferenceMap) -> Self {
        self.references.merge(&references);
        self
    }

    pub fn with_periods(mut self, periods: impl IntoIterator<Item = String>) -> Self {
        self.periods.extend(periods);
        self
    }
}

/// Loads preheats from an [`ObjectStore`]
pub struct PreheatService<S> {
    store: S,
    periods: Box<dyn PeriodResolver>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl<S: ObjectStore> PreheatService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            periods: Box::new(IsoPeriodResolver::new()),
            cancelled: None,
        }
    }

    pub fn with_period_resolver(mut self, resolver: impl PeriodResolver + 'static) -> Self {
        self.periods = Box::new(resolver);
        self
    }

    /// Flag checked between loading phases; setting it aborts the preheat.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reject requests that cannot be served. Data-quality problems (unknown
    /// keys, missing codes) are not errors; they simply resolve to nothing.
    pub fn validate(&self, params: &PreheatParams) -> Result<()> {
        if params.mode == PreheatMode::All && params.classes.is_empty() {
            return Err(PreheatError::InvalidPreheatParams(
                "mode ALL requires at least one class to preheat".to_string(),
            ));
        }
        Ok(())
    }

    pub fn preheat(&self, params: PreheatParams) -> Result<Preheat> {
        self.validate(&params)?;

        let mut preheat = Preheat::new();
        preheat.set_user(params.user.clone().map(Arc::new));

        self.load_defaults(&mut preheat)?;
        self.check_cancelled("fetch")?;

        if params.mode == PreheatMode::Reference {
            let mut refs = collect_references(&params.objects);
            refs.merge(&params.references);
            for object in &params.objects {
                refs.add_object(object);
            }
            self.load_references(&mut preheat, params.identifier, &refs)?;
        }

        // In reference mode, classes are loaded in full on top of the references.
        // Full loads are also indexed by UID so objects without a code stay
        // reachable when matching by content.
        for &object_type in &params.classes {
            let objects: Vec<Arc<IdentifiableObject>> =
                self.store.fetch_all(object_type)?.into_iter().map(Arc::new).collect();
            debug!(%object_type, count = objects.len(), "preheated all objects of type");
            if params.identifier != PreheatIdentifier::Uid {
                preheat.put_all(PreheatIdentifier::Uid, objects.iter().cloned());
            }
            preheat.put_all(params.identifier, objects);
        }

        if params.mode == PreheatMode::Reference {
            // persisted copies were put first and stay authoritative
            preheat.put_all(params.identifier, params.objects.iter().cloned());
        }

        self.check_cancelled("auxiliary maps")?;
        self.load_attributes(&mut preheat, params.identifier)?;
        self.load_uniqueness(&mut preheat, params.identifier);
        self.load_periods(&mut preheat, params.identifier, &params.periods);

        info!(
            mode = ?params.mode,
            identifier = %params.identifier,
            defaults = preheat.defaults().len(),
            "preheat complete"
        );
        Ok(preheat)
    }

    fn check_cancelled(&self, phase: &'static str) -> Result<()> {
        match &self.cancelled {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(PreheatError::Cancelled { phase }),
            _ => Ok(()),
        }
    }

    fn load_defaults(&self, preheat: &mut Preheat) -> Result<()> {
        for object_type in ObjectType::DEFAULT_ELIGIBLE {
            if let Some(default) = self.store.fetch_default(object_type)? {
                preheat.set_default(default);
            }
        }
        Ok(())
    }

    fn load_references(
        &self,
        preheat: &mut Preheat,
        identifier: PreheatIdentifier,
        refs: &ReferenceMap,
    ) -> Result<()> {
        for object_type in refs.object_types() {
            let mut fetched = Vec::new();
            for &strategy in identifier.effective_for(object_type).strategies() {
                let Some(keys) = refs.keys(strategy, object_type).filter(|k| !k.is_empty()) else {
                    continue;
                };
                let objects = if strategy == PreheatIdentifier::Uid {
                    self.store.fetch_by_uid(object_type, keys)?
                } else {
                    self.store.fetch_by_code(object_type, keys)?
                };
                debug!(
                    %object_type,
                    %strategy,
                    requested = keys.len(),
                    found = objects.len(),
                    "fetched referenced objects"
                );
                fetched.extend(objects);
            }
            preheat.put_all(identifier, fetched);
        }
        Ok(())
    }

    /// Mandatory and unique attribute metadata per owning type
    fn load_attributes(&self, preheat: &mut Preheat, identifier: PreheatIdentifier) -> Result<()> {
        let attributes = self.store.fetch_all(ObjectType::Attribute)?;

        for attribute in &attributes {
            let owners: Vec<ObjectType> = attribute
                .scalar("objectTypes")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .filter_map(|name| name.parse().ok())
                .collect();

            for owner in owners {
                if attribute.bool_value("mandatory").unwrap_or(false) {
                    preheat
                        .mandatory_attributes_mut()
                        .entry(owner)
                        .or_default()
                        .insert(attribute.uid.clone());
                }
                if attribute.bool_value("unique").unwrap_or(false) {
                    preheat
                        .unique_attributes_mut()
                        .entry(owner)
                        .or_default()
                        .insert(attribute.uid.clone());
                }
            }
        }

        preheat.put_all(identifier, attributes);
        Ok(())
    }

    /// Existing values of unique properties and unique attributes, for later
    /// uniqueness checks against the import.
    fn load_uniqueness(&self, preheat: &mut Preheat, identifier: PreheatIdentifier) {
        let mut properties = Vec::new();
        let mut attribute_values = Vec::new();

        for object_type in ObjectType::ALL {
            let unique_attributes = preheat
                .unique_attributes(object_type)
                .cloned()
                .unwrap_or_default();

            for object in preheat.all(identifier, object_type) {
                if object.uid.is_empty() {
                    continue;
                }
                if let Some(code) = object.code() {
                    properties.push((object_type, "code", code.to_string(), object.uid.clone()));
                }
                if let Some(name) = object.name().filter(|n| !n.is_empty()) {
                    properties.push((object_type, "name", name.to_string(), object.uid.clone()));
                }

                if unique_attributes.is_empty() {
                    continue;
                }
                for (attribute, value) in attribute_values_of(object) {
                    if unique_attributes.contains(&attribute) {
                        attribute_values.push((object_type, attribute, value, object.uid.clone()));
                    }
                }
            }
        }

        for (object_type, property, value, uid) in properties {
            preheat
                .uniqueness_map_mut()
                .entry(object_type)
                .or_default()
                .entry(property.to_string())
                .or_default()
                .entry(value)
                .or_insert(uid);
        }
        for (object_type, attribute, value, uid) in attribute_values {
            preheat
                .unique_attribute_values_mut()
                .entry(object_type)
                .or_default()
                .entry(attribute)
                .or_default()
                .entry(value)
                .or_insert(uid);
        }
    }

    /// Resolve period types named by preheated objects, plus any requested periods.
    /// Strings that do not parse are skipped.
    fn load_periods(
        &self,
        preheat: &mut Preheat,
        identifier: PreheatIdentifier,
        requested: &BTreeSet<String>,
    ) {
        let mut period_types = BTreeSet::new();
        let mut periods = requested.clone();

        for object_type in ObjectType::ALL {
            for object in preheat.all(identifier, object_type) {
                for property in object_type.properties() {
                    let Some(value) = object.str_value(property.name) else {
                        continue;
                    };
                    if property.name == "periodType" || property.name.ends_with("PeriodType") {
                        period_types.insert(value.to_string());
                    } else if property.name == "period" {
                        periods.insert(value.to_string());
                    }
                }
            }
        }

        for name in period_types {
            if let Some(period_type) = self.periods.resolve_period_type(&name) {
                preheat.put_period_type(name, period_type);
            }
        }
        for iso in periods {
            match self.periods.resolve_period(&iso) {
                Some(period) => {
                    preheat.put_period(period);
                }
                None => debug!(%iso, "skipping unrecognised period"),
            }
        }
    }
}

/// `(attribute uid, value)` pairs from an object's `attributeValues`
fn attribute_values_of(object: &IdentifiableObject) -> Vec<(String, String)> {
    object
        .scalar("attributeValues")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|av| {
            let attribute = av.get("attribute")?.get("id")?.as_str()?;
            let value = match av.get("value")? {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((attribute.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::PeriodType;
    use crate::store::InMemoryObjectStore;
    use serde_json::json;

    #[test]
    fn test_all_mode_requires_classes() {
        let service = PreheatService::new(InMemoryObjectStore::new());
        let result = service.preheat(PreheatParams::new(PreheatMode::All));
        assert!(matches!(result, Err(PreheatError::InvalidPreheatParams(_))));
    }

    #[test]
    fn test_all_mode_loads_every_object() {
        let store = InMemoryObjectStore::new()
            .with(IdentifiableObject::new(ObjectType::DataElement, "deabcdefghA"))
            .with(IdentifiableObject::new(ObjectType::DataElement, "deabcdefghB"))
            .with(IdentifiableObject::new(ObjectType::Program, "programAAAA"));
        let service = PreheatService::new(&store);

        let preheat = service
            .preheat(PreheatParams::new(PreheatMode::All).with_classes([ObjectType::DataElement]))
            .unwrap();

        assert_eq!(preheat.all(PreheatIdentifier::Uid, ObjectType::DataElement).count(), 2);
        assert!(preheat.is_empty_type(PreheatIdentifier::Uid, ObjectType::Program));
    }

    #[test]
    fn test_full_class_load_by_code_also_indexed_by_uid() {
        let store = InMemoryObjectStore::new()
            .with(
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocMALEAAAA")
                    .with_name("Male"),
            )
            .with(
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocFEMALEAA")
                    .with_code("COC_FEMALE")
                    .with_name("Female"),
            );
        let preheat = PreheatService::new(&store)
            .preheat(
                PreheatParams::new(PreheatMode::All)
                    .with_identifier(PreheatIdentifier::Code)
                    .with_classes([ObjectType::CategoryOptionCombo]),
            )
            .unwrap();

        assert_eq!(
            preheat.all(PreheatIdentifier::Code, ObjectType::CategoryOptionCombo).count(),
            1
        );
        assert_eq!(preheat.all(PreheatIdentifier::Uid, ObjectType::CategoryOptionCombo).count(), 2);
        assert!(preheat.contains_key(
            PreheatIdentifier::Uid,
            ObjectType::CategoryOptionCombo,
            "cocMALEAAAA",
        ));
    }

    #[test]
    fn test_defaults_loaded_unconditionally() {
        let store = InMemoryObjectStore::new()
            .with(
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocdefaultA")
                    .with_name("default"),
            )
            .with(
                IdentifiableObject::new(ObjectType::CategoryCombo, "ccdefaultAA")
                    .with_name("default"),
            );
        let preheat = PreheatService::new(&store)
            .preheat(PreheatParams::new(PreheatMode::Reference))
            .unwrap();

        assert_eq!(preheat.defaults().len(), 2);
        assert!(preheat.is_empty());
    }

    #[test]
    fn test_cancellation_between_phases() {
        let flag = Arc::new(AtomicBool::new(true));
        let service = PreheatService::new(InMemoryObjectStore::new()).with_cancellation(flag);
        let result = service.preheat(PreheatParams::new(PreheatMode::Reference));
        assert!(matches!(result, Err(PreheatError::Cancelled { phase: "fetch" })));
    }

    #[test]
    fn test_attribute_metadata_and_unique_values() {
        let store = InMemoryObjectStore::new()
            .with(
                IdentifiableObject::new(ObjectType::Attribute, "attrUniqueA")
                    .with_scalar("unique", true)
                    .with_scalar("objectTypes", json!(["DataElement"])),
            )
            .with(
                IdentifiableObject::new(ObjectType::Attribute, "attrMandatA")
                    .with_scalar("mandatory", true)
                    .with_scalar("objectTypes", json!(["DataElement", "Program"])),
            )
            .with(
                IdentifiableObject::new(ObjectType::DataElement, "deabcdefghA")
                    .with_code("DE_A")
                    .with_scalar(
                        "attributeValues",
                        json!([{ "attribute": { "id": "attrUniqueA" }, "value": "X-1" }]),
                    ),
            );

        let preheat = PreheatService::new(&store)
            .preheat(
                PreheatParams::new(PreheatMode::All).with_classes([ObjectType::DataElement]),
            )
            .unwrap();

        let unique = preheat.unique_attributes(ObjectType::DataElement).unwrap();
        assert!(unique.contains("attrUniqueA"));
        assert!(preheat.mandatory_attributes(ObjectType::Program).unwrap().contains("attrMandatA"));
        let values = preheat.unique_attribute_values(ObjectType::DataElement).unwrap();
        assert_eq!(values["attrUniqueA"]["X-1"], "deabcdefghA");
        assert_eq!(
            preheat.uniqueness_map()[&ObjectType::DataElement]["code"]["DE_A"],
            "deabcdefghA"
        );
    }

    #[test]
    fn test_period_types_and_periods_cached() {
        let store = InMemoryObjectStore::new().with(
            IdentifiableObject::new(ObjectType::Program, "programAAAA")
                .with_scalar("expiryPeriodType", "Monthly"),
        );
        let preheat = PreheatService::new(&store)
            .preheat(
                PreheatParams::new(PreheatMode::Reference)
                    .with_objects([IdentifiableObject::stub(ObjectType::Program, "programAAAA")])
                    .with_periods(["2024Q1".to_string()]),
            )
            .unwrap();

        assert_eq!(preheat.period_type("Monthly"), Some(PeriodType::Monthly));
        assert_eq!(preheat.period("2024Q1").map(|p| p.period_type), Some(PeriodType::Quarterly));
    }

    #[test]
    fn test_unresolvable_requested_period_skipped() {
        let store = InMemoryObjectStore::new()
            .with(IdentifiableObject::new(ObjectType::DataElement, "deAAAAAAAAA"));
        let preheat = PreheatService::new(&store)
            .preheat(
                PreheatParams::new(PreheatMode::Reference)
                    .with_objects(
                        [IdentifiableObject::stub(ObjectType::DataElement, "deAAAAAAAAA")],
                    )
                    .with_periods(["2024X9".to_string(), "202401".to_string()]),
            )
            .unwrap();

        assert!(preheat.period("2024X9").is_none());
        assert!(preheat.period("202401").is_some());
        assert!(preheat
            .get(PreheatIdentifier::Uid, ObjectType::DataElement, "deAAAAAAAAA")
            .is_some());
    }
}
