//! Validation orchestration
//!
//! Runs every enabled hook over every entity of a bundle, in a fixed order:
//! tracked entities, enrollments, events, relationships; within one entity,
//! hooks run in list order. Validation never stops at the first error.

use serde::Serialize;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

use crate::config::ValidationConfig;
use crate::error::Result;

use super::bundle::ValidationContext;
use super::domain::{TrackerRef, TrackerType};
use super::hooks::{default_hooks, HookOutcome, ValidationHook};
use super::report::{ValidationCode, ValidationErrorReporter, ValidationReport};

/// Everything one validation pass found
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub reporter: ValidationErrorReporter,
    /// Entities to leave out of the import
    pub removed: BTreeSet<TrackerRef>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.reporter.has_errors()
    }

    pub fn is_removed(&self, tracker_type: TrackerType, uid: &str) -> bool {
        self.removed.contains(&TrackerRef::new(tracker_type, uid))
    }
}

pub struct TrackerValidator {
    hooks: Vec<Box<dyn ValidationHook>>,
}

impl Default for TrackerValidator {
    fn default() -> Self {
        Self::new(default_hooks())
    }
}

impl TrackerValidator {
    pub fn new(hooks: Vec<Box<dyn ValidationHook>>) -> Self {
        Self { hooks }
    }

    /// The default chain minus hooks disabled in `config`
    pub fn from_config(config: &ValidationConfig) -> Self {
        let hooks = default_hooks()
            .into_iter()
            .filter(|hook| {
                let enabled = config.is_hook_enabled(hook.name());
                if !enabled {
                    debug!(hook = hook.name(), "validation hook disabled");
                }
                enabled
            })
            .collect();
        Self::new(hooks)
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationResult {
        let bundle = ctx.bundle();
        let mut result = ValidationResult::default();

        for te in &bundle.tracked_entities {
            let entity = TrackerRef::new(TrackerType::TrackedEntity, &te.tracked_entity);
            self.run(ctx, &mut result, &entity, |hook, ctx, prior| {
                hook.validate_tracked_entity(ctx, prior, te)
            });
        }
        for enrollment in &bundle.enrollments {
            let entity = TrackerRef::new(TrackerType::Enrollment, &enrollment.enrollment);
            self.run(ctx, &mut result, &entity, |hook, ctx, prior| {
                hook.validate_enrollment(ctx, prior, enrollment)
            });
        }
        for event in &bundle.events {
            let entity = TrackerRef::new(TrackerType::Event, &event.event);
            self.run(ctx, &mut result, &entity, |hook, ctx, prior| {
                hook.validate_event(ctx, prior, event)
            });
        }
        for relationship in &bundle.relationships {
            let entity = TrackerRef::new(TrackerType::Relationship, &relationship.relationship);
            self.run(ctx, &mut result, &entity, |hook, ctx, prior| {
                hook.validate_relationship(ctx, prior, relationship)
            });
        }

        info!(
            entities = bundle.len(),
            errors = result.reporter.error_count(),
            warnings = result.reporter.warning_count(),
            removed = result.removed.len(),
            "tracker validation complete"
        );
        result
    }

    /// Run every hook against one entity, isolating failures per hook
    fn run<F>(
        &self,
        ctx: &mut ValidationContext<'_>,
        result: &mut ValidationResult,
        entity: &TrackerRef,
        call: F,
    ) where
        F: Fn(
            &dyn ValidationHook,
            &ValidationContext<'_>,
            &[ValidationReport],
        ) -> Result<HookOutcome>,
    {
        for hook in &self.hooks {
            let hook = hook.as_ref();
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                call(hook, ctx, result.reporter.reports())
            }));

            let outcome = match attempt {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(hook = hook.name(), %entity, error = %e, "validation hook failed");
                    internal_error(hook, entity, &e.to_string())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        hook = hook.name(),
                        %entity,
                        panic = %message,
                        "validation hook panicked"
                    );
                    internal_error(hook, entity, &message)
                }
            };

            let rejects_entity = outcome
                .reports
                .iter()
                .any(|r| r.is_error_for(entity.tracker_type, &entity.uid));
            if hook.remove_on_error() && rejects_entity {
                result.removed.insert(entity.clone());
            }
            for update in outcome.updates {
                ctx.apply(update);
            }
            for mut report in outcome.reports {
                report.hook = Some(hook.name().to_string());
                result.reporter.add(report);
            }
        }
    }
}

fn internal_error(hook: &dyn ValidationHook, entity: &TrackerRef, message: &str) -> HookOutcome {
    let mut outcome = HookOutcome::new();
    outcome.error(entity, ValidationCode::E9999, [hook.name(), message]);
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
