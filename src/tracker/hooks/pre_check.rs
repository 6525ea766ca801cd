//! Metadata existence checks run before everything else

use crate::error::Result;
use crate::schema::ObjectType;
use crate::tracker::bundle::{ContextUpdate, ValidationContext};
use crate::tracker::domain::{Enrollment, Event, TrackedEntity, TrackerRef, TrackerType};
use crate::tracker::report::{ValidationCode, ValidationReport, NO_ARGS};

use super::{is_registration_program, HookOutcome, ValidationHook};

/// Checks that every metadata object an entity names was preheated, and
/// resolves the enrollment of events that left it out. Entities that fail
/// here are dropped: nothing downstream can make sense of them.
pub struct PreCheckMetaValidationHook;

impl ValidationHook for PreCheckMetaValidationHook {
    fn name(&self) -> &'static str {
        "PreCheckMetaValidationHook"
    }

    fn remove_on_error(&self) -> bool {
        true
    }

    fn validate_tracked_entity(
        &self,
        ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        tracked_entity: &TrackedEntity,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::TrackedEntity, &tracked_entity.tracked_entity);
        let mut outcome = HookOutcome::new();

        let te_type = tracked_entity.tracked_entity_type.as_deref().unwrap_or_default();
        if ctx.get(ObjectType::TrackedEntityType, te_type).is_none() {
            outcome.error(&entity, ValidationCode::E1005, [te_type]);
        }

        let org_unit = tracked_entity.org_unit.as_deref().unwrap_or_default();
        if ctx.get(ObjectType::OrganisationUnit, org_unit).is_none() {
            outcome.error(&entity, ValidationCode::E1049, [org_unit]);
        }

        Ok(outcome)
    }

    fn validate_enrollment(
        &self,
        ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        enrollment: &Enrollment,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::Enrollment, &enrollment.enrollment);
        let mut outcome = HookOutcome::new();

        let org_unit = enrollment.org_unit.as_deref().unwrap_or_default();
        if ctx.get(ObjectType::OrganisationUnit, org_unit).is_none() {
            outcome.error(&entity, ValidationCode::E1070, [org_unit]);
        }

        let program_key = enrollment.program.as_deref().unwrap_or_default();
        match ctx.get(ObjectType::Program, program_key) {
            None => {
                outcome.error(&entity, ValidationCode::E1069, [program_key]);
            }
            Some(program) if !is_registration_program(program) => {
                outcome.error(&entity, ValidationCode::E1014, [program.uid.as_str()]);
            }
            Some(_) => {}
        }

        if enrollment.enrolled_at.is_none() {
            outcome.error(&entity, ValidationCode::E1025, NO_ARGS);
        }
        if enrollment.occurred_at.is_none() {
            outcome.warning(&entity, ValidationCode::W1015, [enrollment.enrollment.as_str()]);
        }

        Ok(outcome)
    }

    fn validate_event(
        &self,
        ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        event: &Event,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::Event, &event.event);
        let mut outcome = HookOutcome::new();

        let org_unit = event.org_unit.as_deref().unwrap_or_default();
        if ctx.get(ObjectType::OrganisationUnit, org_unit).is_none() {
            outcome.error(&entity, ValidationCode::E1011, [org_unit]);
        }

        let stage_key = event.program_stage.as_deref().unwrap_or_default();
        let stage = ctx.get(ObjectType::ProgramStage, stage_key);
        if stage.is_none() {
            outcome.error(&entity, ValidationCode::E1013, [stage_key]);
        }

        let Some(program) = ctx.program_for_event(event) else {
            let program_key = event.program.as_deref().unwrap_or_default();
            outcome.error(&entity, ValidationCode::E1010, [program_key]);
            return Ok(outcome);
        };

        if let Some(stage) = stage {
            let owner = stage.reference("program").map(|p| ctx.resolve(p).uid.as_str());
            if owner != Some(program.uid.as_str()) {
                outcome.error(
                    &entity,
                    ValidationCode::E1089,
                    [event.event.as_str(), stage.uid.as_str(), program.uid.as_str()],
                );
            }
        }

        if event.enrollment.is_none() && is_registration_program(program) {
            match ctx.enrollment_candidates(&event.event) {
                [] => {
                    outcome.error(&entity, ValidationCode::E1033, [event.event.as_str()]);
                }
                [enrollment] => {
                    outcome.update(ContextUpdate::ResolvedEnrollment {
                        event: event.event.clone(),
                        enrollment: enrollment.clone(),
                    });
                }
                candidates => {
                    outcome.error(
                        &entity,
                        ValidationCode::E1034,
                        [event.event.clone(), candidates.join(",")],
                    );
                }
            }
        }

        Ok(outcome)
    }
}
