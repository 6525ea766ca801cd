use chrono::Duration;

use crate::error::Result;
use crate::period::PeriodType;
use crate::tracker::bundle::ValidationContext;
use crate::tracker::domain::{Event, EventStatus, TrackerRef, TrackerType};
use crate::tracker::report::{ValidationCode, ValidationReport, NO_ARGS};

use super::{is_registration_program, HookOutcome, ValidationHook};

/// Event date presence and program expiry rules
pub struct EventDateValidationHook;

impl ValidationHook for EventDateValidationHook {
    fn name(&self) -> &'static str {
        "EventDateValidationHook"
    }

    fn validate_event(
        &self,
        ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        event: &Event,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::Event, &event.event);
        let mut outcome = HookOutcome::new();

        // reported by the pre-check
        let Some(program) = ctx.program_for_event(event) else {
            return Ok(outcome);
        };

        // blank occurredAt only for tracker events that have not happened yet
        let pending_tracker_event = is_registration_program(program) && event.status.is_pending();
        if event.occurred_at.is_none() && !pending_tracker_event {
            outcome.error(&entity, ValidationCode::E1031, NO_ARGS);
        }
        if event.status == EventStatus::Schedule && event.scheduled_at.is_none() {
            outcome.error(&entity, ValidationCode::E1050, NO_ARGS);
        }

        let bypass = ctx.can_bypass_expiry();
        let now = ctx.now();

        let complete_expiry_days = program.i64_value("completeEventsExpiryDays").unwrap_or(0);
        if complete_expiry_days > 0 && event.status == EventStatus::Completed {
            match event.completed_at {
                None => {
                    outcome.error(&entity, ValidationCode::E1042, [event.event.as_str()]);
                }
                Some(completed_at)
                    if !bypass && now > completed_at + Duration::days(complete_expiry_days) =>
                {
                    outcome.error(&entity, ValidationCode::E1043, [event.event.as_str()]);
                }
                Some(_) => {}
            }
        }

        let expiry_days = program.i64_value("expiryDays").unwrap_or(0);
        let expiry_period_type = program.str_value("expiryPeriodType").and_then(|name| {
            ctx.preheat()
                .period_type(name)
                .or_else(|| PeriodType::from_name(name))
        });
        if let Some(period_type) = expiry_period_type.filter(|_| expiry_days > 0) {
            let current = period_type.create_period(now.date_naive());
            let reference_date = event.occurred_at.or(event.scheduled_at);
            if reference_date.is_some_and(|date| date.date_naive() < current.start) && !bypass {
                outcome.error(&entity, ValidationCode::E1047, [event.event.as_str()]);
            }
        }

        Ok(outcome)
    }
}
