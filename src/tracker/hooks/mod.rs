//! Validation hooks
//!
//! A hook inspects one entity at a time and returns what it found. It reads
//! the shared [`ValidationContext`] and the reports produced so far, but
//! never mutates either; cache writes travel back as [`ContextUpdate`]s that
//! the validator applies after the call.

mod event_category_option_combo;
mod event_data_values;
mod event_date;
mod pre_check;
mod relationships;

pub use event_category_option_combo::EventCategoryOptionComboValidationHook;
pub use event_data_values::EventDataValuesValidationHook;
pub use event_date::EventDateValidationHook;
pub use pre_check::PreCheckMetaValidationHook;
pub use relationships::RelationshipsValidationHook;

use crate::error::Result;
use crate::object::IdentifiableObject;

use super::bundle::{ContextUpdate, ValidationContext};
use super::domain::{Enrollment, Event, Relationship, TrackedEntity, TrackerRef};
use super::report::{Severity, ValidationCode, ValidationReport};

/// Program type of registration-less (event) programs
pub const WITHOUT_REGISTRATION: &str = "WITHOUT_REGISTRATION";

/// Reports and context updates produced by one hook call
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    pub reports: Vec<ValidationReport>,
    pub updates: Vec<ContextUpdate>,
}

impl HookOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error<I, S>(&mut self, entity: &TrackerRef, code: ValidationCode, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        debug_assert_eq!(
            code.severity(),
            Severity::Error,
            "{} is not an error code",
            code.as_str()
        );
        self.reports.push(ValidationReport::new(entity, code, args));
        self
    }

    pub fn warning<I, S>(&mut self, entity: &TrackerRef, code: ValidationCode, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        debug_assert_eq!(
            code.severity(),
            Severity::Warning,
            "{} is not a warning code",
            code.as_str()
        );
        self.reports.push(ValidationReport::new(entity, code, args));
        self
    }

    pub fn update(&mut self, update: ContextUpdate) -> &mut Self {
        self.updates.push(update);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(ValidationReport::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty() && self.updates.is_empty()
    }
}

/// One validation step of the tracker import.
///
/// Every method defaults to "nothing to report"; a hook overrides the
/// entity kinds it cares about. Returning `Err` is reserved for internal
/// failures; the validator turns those into `E9999` reports.
pub trait ValidationHook {
    fn name(&self) -> &'static str;

    /// Entities this hook reports an error against are dropped from the import
    fn remove_on_error(&self) -> bool {
        false
    }

    fn validate_tracked_entity(
        &self,
        _ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        _tracked_entity: &TrackedEntity,
    ) -> Result<HookOutcome> {
        Ok(HookOutcome::new())
    }

    fn validate_enrollment(
        &self,
        _ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        _enrollment: &Enrollment,
    ) -> Result<HookOutcome> {
        Ok(HookOutcome::new())
    }

    fn validate_event(
        &self,
        _ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        _event: &Event,
    ) -> Result<HookOutcome> {
        Ok(HookOutcome::new())
    }

    fn validate_relationship(
        &self,
        _ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        _relationship: &Relationship,
    ) -> Result<HookOutcome> {
        Ok(HookOutcome::new())
    }
}

/// The standard hook chain, in execution order
pub fn default_hooks() -> Vec<Box<dyn ValidationHook>> {
    vec![
        Box::new(PreCheckMetaValidationHook),
        Box::new(EventDateValidationHook),
        Box::new(EventCategoryOptionComboValidationHook),
        Box::new(EventDataValuesValidationHook),
        Box::new(RelationshipsValidationHook),
    ]
}

pub(crate) fn is_registration_program(program: &IdentifiableObject) -> bool {
    program.str_value("programType") != Some(WITHOUT_REGISTRATION)
}
