//! Tracker bundle and validation context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::object::IdentifiableObject;
use crate::preheat::{Preheat, PreheatIdentifier, PreheatMode, PreheatParams, ReferenceMap};
use crate::schema::ObjectType;

use super::domain::{Enrollment, Event, Relationship, TrackedEntity, TrackerRef, TrackerType};

/// Authority granting every other authority
pub const SUPERUSER_AUTHORITY: &str = "ALL";

/// Entities submitted in one tracker import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerBundle {
    /// How metadata keys in the payloads are to be read
    #[serde(default)]
    pub identifier: PreheatIdentifier,
    #[serde(default)]
    pub tracked_entities: Vec<TrackedEntity>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl TrackerBundle {
    pub fn new(identifier: PreheatIdentifier) -> Self {
        Self {
            identifier,
            ..Default::default()
        }
    }

    /// Every metadata key the payloads mention, for a reference-mode preheat
    pub fn metadata_references(&self) -> ReferenceMap {
        let mut refs = ReferenceMap::new();
        let mut add = |object_type: ObjectType, key: Option<&str>| {
            let Some(key) = key else { return };
            for &strategy in self.identifier.effective_for(object_type).strategies() {
                refs.add(strategy, object_type, key);
            }
        };

        for te in &self.tracked_entities {
            add(ObjectType::TrackedEntityType, te.tracked_entity_type.as_deref());
            add(ObjectType::OrganisationUnit, te.org_unit.as_deref());
        }
        for enrollment in &self.enrollments {
            add(ObjectType::Program, enrollment.program.as_deref());
            add(ObjectType::OrganisationUnit, enrollment.org_unit.as_deref());
        }
        for event in &self.events {
            add(ObjectType::Program, event.program.as_deref());
            add(ObjectType::ProgramStage, event.program_stage.as_deref());
            add(ObjectType::OrganisationUnit, event.org_unit.as_deref());
            add(ObjectType::CategoryOptionCombo, event.attribute_option_combo.as_deref());
            for option in event.category_option_keys() {
                add(ObjectType::CategoryOption, Some(option));
            }
            for data_value in &event.data_values {
                add(ObjectType::DataElement, Some(data_value.data_element.as_str()));
            }
        }
        for relationship in &self.relationships {
            add(ObjectType::RelationshipType, relationship.relationship_type.as_deref());
        }

        refs
    }

    /// Preheat request covering this bundle. Option combos are loaded in
    /// full since events may name them only through their category options.
    pub fn preheat_params(&self) -> PreheatParams {
        PreheatParams::new(PreheatMode::Reference)
            .with_identifier(self.identifier)
            .with_references(self.metadata_references())
            .with_classes([ObjectType::CategoryOptionCombo])
    }

    pub fn find_tracked_entity(&self, uid: &str) -> Option<&TrackedEntity> {
        self.tracked_entities.iter().find(|te| te.tracked_entity == uid)
    }

    pub fn find_enrollment(&self, uid: &str) -> Option<&Enrollment> {
        self.enrollments.iter().find(|e| e.enrollment == uid)
    }

    pub fn find_event(&self, uid: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.event == uid)
    }

    pub fn find_relationship(&self, uid: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.relationship == uid)
    }

    pub fn contains(&self, entity: &TrackerRef) -> bool {
        let uid = entity.uid.as_str();
        match entity.tracker_type {
            TrackerType::TrackedEntity => self.find_tracked_entity(uid).is_some(),
            TrackerType::Enrollment => self.find_enrollment(uid).is_some(),
            TrackerType::Event => self.find_event(uid).is_some(),
            TrackerType::Relationship => self.find_relationship(uid).is_some(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracked_entities.len()
            + self.enrollments.len()
            + self.events.len()
            + self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entity in `removed`; returns how many were dropped.
    pub fn prune(&mut self, removed: &BTreeSet<TrackerRef>) -> usize {
        let before = self.len();
        let keep = |tracker_type: TrackerType, uid: &str| {
            !removed.contains(&TrackerRef::new(tracker_type, uid))
        };

        self.tracked_entities
            .retain(|te| keep(TrackerType::TrackedEntity, &te.tracked_entity));
        self.enrollments
            .retain(|e| keep(TrackerType::Enrollment, &e.enrollment));
        self.events.retain(|e| keep(TrackerType::Event, &e.event));
        self.relationships
            .retain(|r| keep(TrackerType::Relationship, &r.relationship));

        before - self.len()
    }
}

/// Memoization key for option-combo resolution: sorted option uids plus combo uid
pub type OptionComboKey = (Vec<String>, String);

/// State change requested by a hook, applied by the validator between hook calls
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    CacheOptionCombo {
        key: OptionComboKey,
        option_combo: Arc<IdentifiableObject>,
    },
    ResolvedOptionCombo {
        event: String,
        option_combo: String,
    },
    ResolvedEnrollment {
        event: String,
        enrollment: String,
    },
}

/// Request-scoped state shared by the validation hooks
pub struct ValidationContext<'a> {
    bundle: &'a TrackerBundle,
    preheat: &'a Preheat,
    /// event uid -> enrollments it could belong to
    enrollment_candidates: HashMap<String, Vec<String>>,
    option_combo_cache: HashMap<OptionComboKey, Arc<IdentifiableObject>>,
    /// tracker entities known to exist outside this bundle
    existing: HashSet<TrackerRef>,
    resolved_option_combos: HashMap<String, String>,
    resolved_enrollments: HashMap<String, String>,
    authorities: BTreeSet<String>,
    expiry_bypass_authority: String,
    now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(bundle: &'a TrackerBundle, preheat: &'a Preheat) -> Self {
        let mut context = Self {
            bundle,
            preheat,
            enrollment_candidates: HashMap::new(),
            option_combo_cache: HashMap::new(),
            existing: HashSet::new(),
            resolved_option_combos: HashMap::new(),
            resolved_enrollments: HashMap::new(),
            authorities: user_authorities(preheat),
            expiry_bypass_authority: "F_EDIT_EXPIRED".to_string(),
            now: Utc::now(),
        };
        context.collect_bundle_candidates();
        context
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_expiry_bypass_authority(mut self, authority: impl Into<String>) -> Self {
        self.expiry_bypass_authority = authority.into();
        self
    }

    pub fn with_existing(mut self, existing: impl IntoIterator<Item = TrackerRef>) -> Self {
        self.existing.extend(existing);
        self
    }

    /// Candidate enrollments for `event` known from outside the bundle
    pub fn with_enrollment_candidates(
        mut self,
        event: impl Into<String>,
        enrollments: Vec<String>,
    ) -> Self {
        let candidates = self.enrollment_candidates.entry(event.into()).or_default();
        for enrollment in enrollments {
            if !candidates.contains(&enrollment) {
                candidates.push(enrollment);
            }
        }
        self
    }

    /// Events without an enrollment may belong to a bundle enrollment of the
    /// same tracked entity and program.
    fn collect_bundle_candidates(&mut self) {
        for event in self.bundle.events.iter().filter(|e| e.enrollment.is_none()) {
            let (Some(te), Some(program)) =
                (event.tracked_entity.as_deref(), event.program.as_deref())
            else {
                continue;
            };
            let candidates: Vec<String> = self
                .bundle
                .enrollments
                .iter()
                .filter(|e| {
                    e.tracked_entity.as_deref() == Some(te) && e.program.as_deref() == Some(program)
                })
                .map(|e| e.enrollment.clone())
                .collect();
            if !candidates.is_empty() {
                self.enrollment_candidates.insert(event.event.clone(), candidates);
            }
        }
    }

    pub fn bundle(&self) -> &'a TrackerBundle {
        self.bundle
    }

    pub fn preheat(&self) -> &'a Preheat {
        self.preheat
    }

    pub fn identifier(&self) -> PreheatIdentifier {
        self.bundle.identifier
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Metadata object by payload key, including the registered default
    pub fn get(&self, object_type: ObjectType, key: &str) -> Option<&'a Arc<IdentifiableObject>> {
        let preheat = self.preheat;
        let identifier = self.identifier().effective_for(object_type);
        preheat.get(identifier, object_type, key).or_else(|| {
            preheat.default_for(object_type).filter(|d| {
                identifier
                    .strategies()
                    .iter()
                    .any(|strategy| strategy.key_of(d) == Some(key))
            })
        })
    }

    /// Preheated counterpart of a (possibly stub) reference, else the reference itself
    pub fn resolve(&self, reference: &'a Arc<IdentifiableObject>) -> &'a Arc<IdentifiableObject> {
        let preheat = self.preheat;
        preheat
            .get_object(PreheatIdentifier::Auto, reference)
            .or_else(|| {
                preheat
                    .default_for(reference.object_type())
                    .filter(|_| preheat.is_default(reference))
            })
            .unwrap_or(reference)
    }

    /// The event's program, falling back to the program of its stage
    pub fn program_for_event(&self, event: &Event) -> Option<&'a Arc<IdentifiableObject>> {
        if let Some(key) = event.program.as_deref() {
            return self.get(ObjectType::Program, key);
        }
        let stage = self.get(ObjectType::ProgramStage, event.program_stage.as_deref()?)?;
        stage.reference("program").map(|p| self.resolve(p))
    }

    pub fn enrollment_candidates(&self, event: &str) -> &[String] {
        self.enrollment_candidates.get(event).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn cached_option_combo(&self, key: &OptionComboKey) -> Option<&Arc<IdentifiableObject>> {
        self.option_combo_cache.get(key)
    }

    pub fn resolved_option_combo(&self, event: &str) -> Option<&str> {
        self.resolved_option_combos.get(event).map(String::as_str)
    }

    pub fn resolved_enrollment(&self, event: &str) -> Option<&str> {
        self.resolved_enrollments.get(event).map(String::as_str)
    }

    /// Known to exist, either in this bundle or already persisted
    pub fn exists(&self, entity: &TrackerRef) -> bool {
        self.bundle.contains(entity) || self.existing.contains(entity)
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority) || self.authorities.contains(SUPERUSER_AUTHORITY)
    }

    pub fn can_bypass_expiry(&self) -> bool {
        self.has_authority(&self.expiry_bypass_authority)
    }

    pub fn apply(&mut self, update: ContextUpdate) {
        match update {
            ContextUpdate::CacheOptionCombo { key, option_combo } => {
                self.option_combo_cache.entry(key).or_insert(option_combo);
            }
            ContextUpdate::ResolvedOptionCombo { event, option_combo } => {
                self.resolved_option_combos.insert(event, option_combo);
            }
            ContextUpdate::ResolvedEnrollment { event, enrollment } => {
                self.resolved_enrollments.insert(event, enrollment);
            }
        }
    }
}

/// Authorities granted through the acting user's roles
fn user_authorities(preheat: &Preheat) -> BTreeSet<String> {
    let Some(user) = preheat.user() else {
        return BTreeSet::new();
    };
    let credentials = preheat
        .get(PreheatIdentifier::Uid, ObjectType::UserCredentials, &user.uid)
        .or_else(|| user.reference("userCredentials"));

    credentials
        .map(|c| c.collection("userRoles"))
        .unwrap_or_default()
        .iter()
        .map(|role| {
            preheat
                .get_object(PreheatIdentifier::Uid, role)
                .unwrap_or(role)
        })
        .flat_map(|role| {
            role.scalar("authorities")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::domain::{DataValue, RelationshipItem};
    use serde_json::json;

    fn bundle() -> TrackerBundle {
        let mut bundle = TrackerBundle::new(PreheatIdentifier::Uid);
        bundle.enrollments.push(Enrollment {
            enrollment: "enAAAAAAAAA".into(),
            tracked_entity: Some("teAAAAAAAAA".into()),
            program: Some("programAAAA".into()),
            ..Default::default()
        });
        bundle.events.push(Event {
            event: "evAAAAAAAAA".into(),
            tracked_entity: Some("teAAAAAAAAA".into()),
            program: Some("programAAAA".into()),
            program_stage: Some("stageAAAAAA".into()),
            attribute_category_options: Some("optAAAAAAAA;optBBBBBBBB".into()),
            data_values: vec![DataValue::new("deabcdefghA", "1")],
            ..Default::default()
        });
        bundle.relationships.push(Relationship {
            relationship: "relAAAAAAAA".into(),
            relationship_type: Some("reltypeAAAA".into()),
            from: RelationshipItem::tracked_entity("teAAAAAAAAA"),
            to: RelationshipItem::event("evAAAAAAAAA"),
        });
        bundle
    }

    #[test]
    fn test_metadata_references() {
        let refs = bundle().metadata_references();
        assert!(refs.contains(PreheatIdentifier::Uid, ObjectType::Program, "programAAAA"));
        assert!(refs.contains(PreheatIdentifier::Uid, ObjectType::CategoryOption, "optBBBBBBBB"));
        assert!(refs.contains(PreheatIdentifier::Uid, ObjectType::DataElement, "deabcdefghA"));
        assert!(refs.contains(PreheatIdentifier::Uid, ObjectType::RelationshipType, "reltypeAAAA"));
        assert!(!refs.contains(PreheatIdentifier::Code, ObjectType::Program, "programAAAA"));
    }

    #[test]
    fn test_prune_removes_only_listed_entities() {
        let mut bundle = bundle();
        let removed = BTreeSet::from([
            TrackerRef::new(TrackerType::Event, "evAAAAAAAAA"),
            TrackerRef::new(TrackerType::Enrollment, "missingAAAA"),
        ]);
        assert_eq!(bundle.prune(&removed), 1);
        assert!(bundle.events.is_empty());
        assert_eq!(bundle.enrollments.len(), 1);
    }

    #[test]
    fn test_context_collects_enrollment_candidates_from_bundle() {
        let bundle = bundle();
        let preheat = Preheat::new();
        let context = ValidationContext::new(&bundle, &preheat)
            .with_enrollment_candidates(
                "evAAAAAAAAA",
                vec!["enAAAAAAAAA".into(), "enBBBBBBBBB".into()],
            );

        assert_eq!(context.enrollment_candidates("evAAAAAAAAA"), ["enAAAAAAAAA", "enBBBBBBBBB"]);
        assert!(context.enrollment_candidates("unknownAAAA").is_empty());
        assert!(context.exists(&TrackerRef::new(TrackerType::Event, "evAAAAAAAAA")));
    }

    #[test]
    fn test_authorities_from_user_roles() {
        let role = IdentifiableObject::new(ObjectType::UserAuthorityGroup, "roleAAAAAAA")
            .with_scalar("authorities", json!(["F_EDIT_EXPIRED", "F_TRACKER_IMPORT"]));
        let credentials = IdentifiableObject::new(ObjectType::UserCredentials, "credsAAAAAA")
            .with_scalar("username", "admin")
            .with_collection("userRoles", vec![role]);
        let user = IdentifiableObject::new(ObjectType::User, "userAAAAAAA")
            .with_reference("userCredentials", credentials);

        let mut preheat = Preheat::new();
        preheat.set_user(Some(Arc::new(user)));
        let bundle = TrackerBundle::default();
        let context = ValidationContext::new(&bundle, &preheat);

        assert!(context.can_bypass_expiry());
        assert!(!context.has_authority("F_METADATA_IMPORT"));
    }

    #[test]
    fn test_apply_updates() {
        let bundle = bundle();
        let preheat = Preheat::new();
        let mut context = ValidationContext::new(&bundle, &preheat);

        context.apply(ContextUpdate::ResolvedEnrollment {
            event: "evAAAAAAAAA".into(),
            enrollment: "enAAAAAAAAA".into(),
        });
        let key: OptionComboKey = (vec!["optAAAAAAAA".into()], "ccAAAAAAAAA".into());
        context.apply(ContextUpdate::CacheOptionCombo {
            key: key.clone(),
            option_combo: Arc::new(IdentifiableObject::new(
                ObjectType::CategoryOptionCombo,
                "cocAAAAAAAA",
            )),
        });

        assert_eq!(context.resolved_enrollment("evAAAAAAAAA"), Some("enAAAAAAAAA"));
        assert_eq!(context.cached_option_combo(&key).map(|c| c.uid.as_str()), Some("cocAAAAAAAA"));
    }

    #[test]
    fn test_default_fallback_follows_identifier() {
        let mut preheat = Preheat::new();
        preheat.set_default(
            IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocDEFAULTA")
                .with_code("default")
                .with_name("default"),
        );

        let by_uid = TrackerBundle::new(PreheatIdentifier::Uid);
        let context = ValidationContext::new(&by_uid, &preheat);
        assert!(context.get(ObjectType::CategoryOptionCombo, "cocDEFAULTA").is_some());
        assert!(context.get(ObjectType::CategoryOptionCombo, "default").is_none());

        let by_code = TrackerBundle::new(PreheatIdentifier::Code);
        let context = ValidationContext::new(&by_code, &preheat);
        assert!(context.get(ObjectType::CategoryOptionCombo, "default").is_some());
        assert!(context.get(ObjectType::CategoryOptionCombo, "cocDEFAULTA").is_none());

        let by_either = TrackerBundle::new(PreheatIdentifier::Auto);
        let context = ValidationContext::new(&by_either, &preheat);
        assert!(context.get(ObjectType::CategoryOptionCombo, "default").is_some());
        assert!(context.get(ObjectType::CategoryOptionCombo, "cocDEFAULTA").is_some());
    }
}
