use serde_json::Value;

use crate::error::Result;
use crate::object::IdentifiableObject;
use crate::schema::ObjectType;
use crate::tracker::bundle::ValidationContext;
use crate::tracker::domain::{Relationship, RelationshipItem, TrackerRef, TrackerType};
use crate::tracker::report::{ValidationCode, ValidationReport};

use super::{HookOutcome, ValidationHook};

/// Structural and type-constraint checks on relationships.
///
/// Malformed items (E4001) stop validation of the relationship right away;
/// the remaining checks all assume each side points at exactly one entity.
pub struct RelationshipsValidationHook;

impl ValidationHook for RelationshipsValidationHook {
    fn name(&self) -> &'static str {
        "RelationshipsValidationHook"
    }

    fn remove_on_error(&self) -> bool {
        true
    }

    fn validate_relationship(
        &self,
        ctx: &ValidationContext<'_>,
        prior: &[ValidationReport],
        relationship: &Relationship,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::Relationship, &relationship.relationship);
        let mut outcome = HookOutcome::new();

        for item in [&relationship.from, &relationship.to] {
            if !item.is_exclusive() {
                outcome.error(
                    &entity,
                    ValidationCode::E4001,
                    [item.canonical(), relationship.relationship.clone()],
                );
            }
        }
        if outcome.has_errors() {
            return Ok(outcome);
        }

        let type_key = relationship.relationship_type.as_deref().unwrap_or_default();
        let Some(relationship_type) = ctx.get(ObjectType::RelationshipType, type_key) else {
            outcome.error(&entity, ValidationCode::E4006, [type_key]);
            return Ok(outcome);
        };

        if relationship.from.canonical() == relationship.to.canonical() {
            outcome.error(&entity, ValidationCode::E4000, [relationship.relationship.as_str()]);
        }

        check_constraint(
            &mut outcome,
            &entity,
            relationship_type,
            "fromConstraint",
            &relationship.from,
        );
        check_constraint(
            &mut outcome,
            &entity,
            relationship_type,
            "toConstraint",
            &relationship.to,
        );

        for target in [&relationship.from, &relationship.to]
            .into_iter()
            .filter_map(RelationshipItem::target)
        {
            if prior.iter().any(|r| r.is_error_for(target.tracker_type, &target.uid)) {
                outcome.error(
                    &entity,
                    ValidationCode::E4011,
                    [
                        relationship.relationship.as_str(),
                        target.tracker_type.as_str(),
                        target.uid.as_str(),
                    ],
                );
            } else if !ctx.exists(&target) {
                outcome.error(
                    &entity,
                    ValidationCode::E4012,
                    [target.tracker_type.as_str(), target.uid.as_str()],
                );
            }
        }

        Ok(outcome)
    }
}

/// Entity kind a relationship-type constraint asks for
fn constraint_kind(relationship_type: &IdentifiableObject, side: &str) -> Option<TrackerType> {
    let entity = relationship_type
        .scalar(side)?
        .get("relationshipEntity")
        .and_then(Value::as_str)?;
    match entity {
        "TRACKED_ENTITY_INSTANCE" | "TRACKED_ENTITY" => Some(TrackerType::TrackedEntity),
        "PROGRAM_INSTANCE" | "ENROLLMENT" => Some(TrackerType::Enrollment),
        "PROGRAM_STAGE_INSTANCE" | "EVENT" => Some(TrackerType::Event),
        _ => None,
    }
}

fn check_constraint(
    outcome: &mut HookOutcome,
    entity: &TrackerRef,
    relationship_type: &IdentifiableObject,
    side: &str,
    item: &RelationshipItem,
) {
    let (Some(expected), Some(found)) =
        (constraint_kind(relationship_type, side), item.target())
    else {
        return;
    };
    if expected != found.tracker_type {
        outcome.error(
            entity,
            ValidationCode::E4010,
            [
                relationship_type.uid.as_str(),
                expected.as_str(),
                found.tracker_type.as_str(),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preheat::{Preheat, PreheatIdentifier};
    use crate::tracker::bundle::TrackerBundle;
    use crate::tracker::domain::{Event, TrackedEntity};
    use serde_json::json;

    fn preheat() -> Preheat {
        let mut preheat = Preheat::new();
        preheat.put(
            PreheatIdentifier::Uid,
            IdentifiableObject::new(ObjectType::RelationshipType, "reltypeAAAA")
                .with_name("Mother to child")
                .with_scalar(
                    "fromConstraint",
                    json!({ "relationshipEntity": "TRACKED_ENTITY_INSTANCE" }),
                )
                .with_scalar(
                    "toConstraint",
                    json!({ "relationshipEntity": "TRACKED_ENTITY_INSTANCE" }),
                ),
        );
        preheat
    }

    fn bundle() -> TrackerBundle {
        let mut bundle = TrackerBundle::default();
        for uid in ["teMOTHERAAA", "teCHILDAAAA"] {
            bundle.tracked_entities.push(TrackedEntity {
                tracked_entity: uid.into(),
                ..Default::default()
            });
        }
        bundle.events.push(Event {
            event: "evAAAAAAAAA".into(),
            ..Default::default()
        });
        bundle
    }

    fn relationship(from: RelationshipItem, to: RelationshipItem) -> Relationship {
        Relationship {
            relationship: "relAAAAAAAA".into(),
            relationship_type: Some("reltypeAAAA".into()),
            from,
            to,
        }
    }

    fn codes(outcome: &HookOutcome) -> Vec<&'static str> {
        outcome.reports.iter().map(|r| r.code.as_str()).collect()
    }

    #[test]
    fn test_valid_relationship() {
        let (preheat, bundle) = (preheat(), bundle());
        let ctx = ValidationContext::new(&bundle, &preheat);
        let rel = relationship(
            RelationshipItem::tracked_entity("teMOTHERAAA"),
            RelationshipItem::tracked_entity("teCHILDAAAA"),
        );
        let outcome = RelationshipsValidationHook.validate_relationship(&ctx, &[], &rel).unwrap();
        assert!(outcome.reports.is_empty());
    }

    #[test]
    fn test_item_with_two_entities_short_circuits() {
        let (preheat, bundle) = (preheat(), bundle());
        let ctx = ValidationContext::new(&bundle, &preheat);
        let rel = Relationship {
            relationship_type: Some("reltypeMISS".into()),
            ..relationship(
                RelationshipItem {
                    tracked_entity: Some("teMOTHERAAA".into()),
                    enrollment: Some("enAAAAAAAAA".into()),
                    event: None,
                },
                RelationshipItem::tracked_entity("teMOTHERAAA"),
            )
        };
        let outcome = RelationshipsValidationHook.validate_relationship(&ctx, &[], &rel).unwrap();
        assert_eq!(codes(&outcome), vec!["E4001"]);
        assert_eq!(outcome.reports[0].args[0], "teMOTHERAAA:enAAAAAAAAA:null");
    }

    #[test]
    fn test_unknown_type() {
        let (preheat, bundle) = (preheat(), bundle());
        let ctx = ValidationContext::new(&bundle, &preheat);
        let mut rel = relationship(
            RelationshipItem::tracked_entity("teMOTHERAAA"),
            RelationshipItem::tracked_entity("teCHILDAAAA"),
        );
        rel.relationship_type = Some("reltypeMISS".into());
        let outcome = RelationshipsValidationHook.validate_relationship(&ctx, &[], &rel).unwrap();
        assert_eq!(codes(&outcome), vec!["E4006"]);
    }

    #[test]
    fn test_self_link_and_constraint_mismatch() {
        let (preheat, bundle) = (preheat(), bundle());
        let ctx = ValidationContext::new(&bundle, &preheat);

        let self_link = relationship(
            RelationshipItem::tracked_entity("teMOTHERAAA"),
            RelationshipItem::tracked_entity("teMOTHERAAA"),
        );
        let outcome = RelationshipsValidationHook
            .validate_relationship(&ctx, &[], &self_link)
            .unwrap();
        assert_eq!(codes(&outcome), vec!["E4000"]);

        // an empty slot is the same as an absent one
        let padded_self_link = relationship(
            RelationshipItem::tracked_entity("teMOTHERAAA"),
            RelationshipItem {
                enrollment: Some(String::new()),
                ..RelationshipItem::tracked_entity("teMOTHERAAA")
            },
        );
        let outcome = RelationshipsValidationHook
            .validate_relationship(&ctx, &[], &padded_self_link)
            .unwrap();
        assert_eq!(codes(&outcome), vec!["E4000"]);

        let wrong_kind = relationship(
            RelationshipItem::tracked_entity("teMOTHERAAA"),
            RelationshipItem::event("evAAAAAAAAA"),
        );
        let outcome = RelationshipsValidationHook
            .validate_relationship(&ctx, &[], &wrong_kind)
            .unwrap();
        assert_eq!(codes(&outcome), vec!["E4010"]);
        assert_eq!(outcome.reports[0].args, vec!["reltypeAAAA", "TRACKED_ENTITY", "EVENT"]);
    }

    #[test]
    fn test_broken_and_missing_references() {
        let (preheat, bundle) = (preheat(), bundle());
        let ctx = ValidationContext::new(&bundle, &preheat)
            .with_existing([TrackerRef::new(TrackerType::TrackedEntity, "tePERSISTED")]);

        let prior = vec![ValidationReport::new(
            &TrackerRef::new(TrackerType::TrackedEntity, "teMOTHERAAA"),
            ValidationCode::E1005,
            ["typeMISSING"],
        )];
        let rel = relationship(
            RelationshipItem::tracked_entity("teMOTHERAAA"),
            RelationshipItem::tracked_entity("teNOWHEREAA"),
        );
        let outcome = RelationshipsValidationHook
            .validate_relationship(&ctx, &prior, &rel)
            .unwrap();
        assert_eq!(codes(&outcome), vec!["E4011", "E4012"]);

        let persisted = relationship(
            RelationshipItem::tracked_entity("tePERSISTED"),
            RelationshipItem::tracked_entity("teCHILDAAAA"),
        );
        let outcome = RelationshipsValidationHook
            .validate_relationship(&ctx, &prior, &persisted)
            .unwrap();
        assert!(outcome.reports.is_empty());
    }
}
