use std::collections::BTreeSet;

use crate::error::Result;
use crate::schema::ObjectType;
use crate::tracker::bundle::ValidationContext;
use crate::tracker::domain::{Event, TrackerRef, TrackerType};
use crate::tracker::report::{ValidationCode, ValidationReport};

use super::{HookOutcome, ValidationHook};

/// Data values must name known data elements of the event's program stage,
/// and every compulsory element of the stage must have a value.
pub struct EventDataValuesValidationHook;

impl ValidationHook for EventDataValuesValidationHook {
    fn name(&self) -> &'static str {
        "EventDataValuesValidationHook"
    }

    fn validate_event(
        &self,
        ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        event: &Event,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::Event, &event.event);
        let mut outcome = HookOutcome::new();

        let Some(stage) = event
            .program_stage
            .as_deref()
            .and_then(|key| ctx.get(ObjectType::ProgramStage, key))
        else {
            return Ok(outcome);
        };

        let stage_elements: Vec<_> = stage
            .collection("programStageDataElements")
            .iter()
            .map(|psde| ctx.resolve(psde))
            .filter_map(|psde| {
                let element = psde.reference("dataElement")?;
                Some((element.uid.as_str(), psde.bool_value("compulsory").unwrap_or(false)))
            })
            .collect();

        let mut provided = BTreeSet::new();
        for data_value in &event.data_values {
            let Some(element) = ctx.get(ObjectType::DataElement, &data_value.data_element) else {
                outcome.error(&entity, ValidationCode::E1304, [data_value.data_element.as_str()]);
                continue;
            };
            if !stage_elements.iter().any(|(uid, _)| *uid == element.uid) {
                outcome.error(
                    &entity,
                    ValidationCode::E1305,
                    [element.uid.as_str(), stage.uid.as_str()],
                );
            }
            if data_value.has_value() {
                provided.insert(element.uid.as_str());
            }
        }

        // every missing compulsory element is reported on its own
        for (uid, _) in stage_elements.iter().filter(|(_, compulsory)| *compulsory) {
            if !provided.contains(uid) {
                outcome.error(&entity, ValidationCode::E1303, [*uid]);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::IdentifiableObject;
    use crate::preheat::{Preheat, PreheatIdentifier};
    use crate::tracker::bundle::TrackerBundle;
    use crate::tracker::domain::DataValue;

    fn stage_element(de: &str, compulsory: bool) -> IdentifiableObject {
        IdentifiableObject::new(ObjectType::ProgramStageDataElement, format!("psde{}", de))
            .with_scalar("compulsory", compulsory)
            .with_reference("dataElement", IdentifiableObject::stub(ObjectType::DataElement, de))
    }

    fn preheat() -> Preheat {
        let mut preheat = Preheat::new();
        preheat.put(
            PreheatIdentifier::Uid,
            IdentifiableObject::new(ObjectType::ProgramStage, "stageAAAAAA")
                .with_name("Visit")
                .with_collection(
                    "programStageDataElements",
                    vec![
                        stage_element("deAAAAAAAAA", true),
                        stage_element("deBBBBBBBBB", true),
                        stage_element("deCCCCCCCCC", false),
                    ],
                ),
        );
        for uid in ["deAAAAAAAAA", "deBBBBBBBBB", "deCCCCCCCCC", "deOTHERAAAA"] {
            preheat.put(
                PreheatIdentifier::Uid,
                IdentifiableObject::new(ObjectType::DataElement, uid).with_name(uid),
            );
        }
        preheat
    }

    fn event(values: Vec<DataValue>) -> Event {
        Event {
            event: "evAAAAAAAAA".into(),
            program_stage: Some("stageAAAAAA".into()),
            data_values: values,
            ..Default::default()
        }
    }

    fn validate(event: &Event) -> HookOutcome {
        let preheat = preheat();
        let bundle = TrackerBundle::default();
        let ctx = ValidationContext::new(&bundle, &preheat);
        EventDataValuesValidationHook.validate_event(&ctx, &[], event).unwrap()
    }

    #[test]
    fn test_each_missing_compulsory_element_reported() {
        let outcome = validate(&event(vec![DataValue::new("deCCCCCCCCC", "x")]));
        let missing: Vec<_> = outcome.reports.iter().map(|r| r.args[0].as_str()).collect();
        assert_eq!(missing, vec!["deAAAAAAAAA", "deBBBBBBBBB"]);
        assert!(outcome.reports.iter().all(|r| r.code == ValidationCode::E1303));
    }

    #[test]
    fn test_empty_value_does_not_satisfy_compulsory() {
        let outcome = validate(&event(vec![
            DataValue::new("deAAAAAAAAA", "1"),
            DataValue {
                data_element: "deBBBBBBBBB".into(),
                value: None,
            },
        ]));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.reports[0].args, vec!["deBBBBBBBBB"]);
    }

    #[test]
    fn test_unknown_and_foreign_elements() {
        let outcome = validate(&event(vec![
            DataValue::new("deAAAAAAAAA", "1"),
            DataValue::new("deBBBBBBBBB", "2"),
            DataValue::new("deMISSINGAA", "3"),
            DataValue::new("deOTHERAAAA", "4"),
        ]));
        let codes: Vec<_> = outcome.reports.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![ValidationCode::E1304, ValidationCode::E1305]);
    }
}
