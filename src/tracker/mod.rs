//! Tracker import validation
//!
//! A [`TrackerBundle`] is checked against a loaded [`Preheat`](crate::preheat::Preheat)
//! by a chain of [`ValidationHook`]s driven by the [`TrackerValidator`].

pub mod bundle;
pub mod domain;
pub mod hooks;
pub mod report;
pub mod validator;

pub use bundle::{
    ContextUpdate, OptionComboKey, TrackerBundle, ValidationContext, SUPERUSER_AUTHORITY,
};
pub use domain::{
    DataValue, Enrollment, EnrollmentStatus, Event, EventStatus, Relationship, RelationshipItem,
    TrackedEntity, TrackerRef, TrackerType,
};
pub use hooks::{default_hooks, HookOutcome, ValidationHook};
pub use report::{Severity, ValidationCode, ValidationErrorReporter, ValidationReport, NO_ARGS};
pub use validator::{TrackerValidator, ValidationResult};
