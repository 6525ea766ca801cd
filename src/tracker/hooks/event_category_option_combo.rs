use std::sync::Arc;

use crate::error::Result;
use crate::object::IdentifiableObject;
use crate::preheat::PreheatIdentifier;
use crate::schema::ObjectType;
use crate::tracker::bundle::{ContextUpdate, OptionComboKey, ValidationContext};
use crate::tracker::domain::{Event, TrackerRef, TrackerType};
use crate::tracker::report::{ValidationCode, ValidationReport, NO_ARGS};

use super::{HookOutcome, ValidationHook};

/// Resolves each event's attribute option combo.
///
/// Resolution order: the category options given on the event (matched as a
/// set against the program's category combo), else the explicit option combo,
/// else the system default. The resolved combo is handed to the context for
/// the persistence step.
pub struct EventCategoryOptionComboValidationHook;

impl ValidationHook for EventCategoryOptionComboValidationHook {
    fn name(&self) -> &'static str {
        "EventCategoryOptionComboValidationHook"
    }

    fn validate_event(
        &self,
        ctx: &ValidationContext<'_>,
        _prior: &[ValidationReport],
        event: &Event,
    ) -> Result<HookOutcome> {
        let entity = TrackerRef::new(TrackerType::Event, &event.event);
        let mut outcome = HookOutcome::new();

        let Some(program) = ctx.program_for_event(event) else {
            return Ok(outcome);
        };

        let preheat = ctx.preheat();
        let default_combo = preheat
            .default_for(ObjectType::CategoryCombo)
            .map(|c| c.uid.as_str());
        let combo = program
            .reference("categoryCombo")
            .map(|c| ctx.resolve(c).uid.as_str())
            .or(default_combo)
            .unwrap_or_default();
        let program_has_default_combo = default_combo.map_or(true, |d| d == combo);

        let explicit = event.attribute_option_combo.as_deref().filter(|k| !k.is_empty());
        let options = event.category_option_keys();

        let resolved = if !options.is_empty() {
            let mut option_uids = Vec::with_capacity(options.len());
            for &key in &options {
                match ctx.get(ObjectType::CategoryOption, key) {
                    Some(option) => option_uids.push(option.uid.clone()),
                    None => {
                        outcome.error(&entity, ValidationCode::E1116, [key]);
                    }
                }
            }
            if outcome.has_errors() {
                return Ok(outcome);
            }
            option_uids.sort();
            option_uids.dedup();

            let key: OptionComboKey = (option_uids, combo.to_string());
            match ctx.cached_option_combo(&key) {
                Some(cached) => Some(Arc::clone(cached)),
                None => {
                    let found = find_option_combo(ctx, &key);
                    if let Some(found) = &found {
                        outcome.update(ContextUpdate::CacheOptionCombo {
                            key,
                            option_combo: Arc::clone(found),
                        });
                    }
                    found
                }
            }
        } else if let Some(key) = explicit {
            match ctx.get(ObjectType::CategoryOptionCombo, key) {
                Some(option_combo) => Some(Arc::clone(option_combo)),
                None => {
                    outcome.error(&entity, ValidationCode::E1115, [key]);
                    return Ok(outcome);
                }
            }
        } else {
            None
        };

        let requested = if options.is_empty() {
            explicit.unwrap_or("default").to_string()
        } else {
            options.join(";")
        };

        let option_combo = match resolved {
            Some(option_combo) => {
                let agrees =
                    |key: &str| option_combo.uid == key || option_combo.code() == Some(key);
                if explicit.is_some_and(|key| !agrees(key)) {
                    outcome.error(&entity, ValidationCode::E1117, [requested]);
                    return Ok(outcome);
                }
                option_combo
            }
            None => match preheat.default_for(ObjectType::CategoryOptionCombo) {
                Some(default)
                    if explicit
                        .map_or(true, |key| default.uid == key || default.code() == Some(key)) =>
                {
                    Arc::clone(default)
                }
                _ => {
                    outcome.error(&entity, ValidationCode::E1117, [requested]);
                    return Ok(outcome);
                }
            },
        };

        if preheat.is_default(&option_combo) {
            if !program_has_default_combo {
                outcome.error(&entity, ValidationCode::E1055, NO_ARGS);
                return Ok(outcome);
            }
        } else if option_combo.reference("categoryCombo").map(|c| c.uid.as_str()) != Some(combo) {
            outcome.error(
                &entity,
                ValidationCode::E1054,
                [option_combo.uid.as_str(), combo],
            );
            return Ok(outcome);
        }

        outcome.update(ContextUpdate::ResolvedOptionCombo {
            event: event.event.clone(),
            option_combo: option_combo.uid.clone(),
        });
        Ok(outcome)
    }
}

/// Option combo of `combo` whose category options are exactly `option_uids`
fn find_option_combo(
    ctx: &ValidationContext<'_>,
    (option_uids, combo): &OptionComboKey,
) -> Option<Arc<IdentifiableObject>> {
    ctx.preheat()
        .all(PreheatIdentifier::Uid, ObjectType::CategoryOptionCombo)
        .find(|candidate| {
            if candidate.reference("categoryCombo").map(|c| &c.uid) != Some(combo) {
                return false;
            }
            let mut uids: Vec<&str> = candidate
                .collection("categoryOptions")
                .iter()
                .map(|o| o.uid.as_str())
                .collect();
            uids.sort_unstable();
            uids.dedup();
            uids == *option_uids
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preheat::Preheat;
    use crate::tracker::bundle::TrackerBundle;

    fn preheat() -> Preheat {
        let option =
            |uid: &str| IdentifiableObject::new(ObjectType::CategoryOption, uid).with_name(uid);
        let mut preheat = Preheat::new();

        preheat
            .set_default(
                IdentifiableObject::new(ObjectType::CategoryCombo, "ccDEFAULTAA")
                    .with_name("default"),
            )
            .set_default(
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocDEFAULTA")
                    .with_name("default")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccDEFAULTAA"),
                    ),
            );

        preheat
            .put(
                PreheatIdentifier::Uid,
                IdentifiableObject::new(ObjectType::Program, "programAAAA")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccAAAAAAAAA"),
                    ),
            )
            .put(
                PreheatIdentifier::Uid,
                IdentifiableObject::new(ObjectType::Program, "programDEFA")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccDEFAULTAA"),
                    ),
            )
            .put(PreheatIdentifier::Uid, option("optAAAAAAAA"))
            .put(PreheatIdentifier::Uid, option("optBBBBBBBB"))
            .put(
                PreheatIdentifier::Uid,
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocAAAAAAAA")
                    .with_name("A, B")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccAAAAAAAAA"),
                    )
                    .with_collection(
                        "categoryOptions",
                        vec![
                            IdentifiableObject::stub(ObjectType::CategoryOption, "optAAAAAAAA"),
                            IdentifiableObject::stub(ObjectType::CategoryOption, "optBBBBBBBB"),
                        ],
                    ),
            )
            .put(
                PreheatIdentifier::Uid,
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocOTHERAAA")
                    .with_name("Other")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccOTHERAAAA"),
                    ),
            );
        preheat
    }

    fn event(program: &str) -> Event {
        Event {
            event: "evAAAAAAAAA".into(),
            program: Some(program.into()),
            ..Default::default()
        }
    }

    fn resolved(outcome: &HookOutcome) -> Option<&str> {
        outcome.updates.iter().find_map(|u| match u {
            ContextUpdate::ResolvedOptionCombo { option_combo, .. } => Some(option_combo.as_str()),
            _ => None,
        })
    }

    fn codes(outcome: &HookOutcome) -> Vec<&'static str> {
        outcome.reports.iter().map(|r| r.code.as_str()).collect()
    }

    #[test]
    fn test_resolves_by_category_options_and_caches() {
        let preheat = preheat();
        let bundle = TrackerBundle::default();
        let mut ctx = ValidationContext::new(&bundle, &preheat);
        let hook = EventCategoryOptionComboValidationHook;

        let mut by_options = event("programAAAA");
        by_options.attribute_category_options = Some("optBBBBBBBB;optAAAAAAAA".into());

        let outcome = hook.validate_event(&ctx, &[], &by_options).unwrap();
        assert!(outcome.reports.is_empty());
        assert_eq!(resolved(&outcome), Some("cocAAAAAAAA"));
        assert_eq!(outcome.updates.len(), 2);

        for update in outcome.updates {
            ctx.apply(update);
        }
        let key: OptionComboKey = (
            vec!["optAAAAAAAA".to_string(), "optBBBBBBBB".to_string()],
            "ccAAAAAAAAA".to_string(),
        );
        assert!(ctx.cached_option_combo(&key).is_some());

        // second lookup is served from the cache
        let outcome = hook.validate_event(&ctx, &[], &by_options).unwrap();
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(resolved(&outcome), Some("cocAAAAAAAA"));
    }

    #[test]
    fn test_explicit_option_combo() {
        let preheat = preheat();
        let bundle = TrackerBundle::default();
        let ctx = ValidationContext::new(&bundle, &preheat);
        let hook = EventCategoryOptionComboValidationHook;

        let mut explicit = event("programAAAA");
        explicit.attribute_option_combo = Some("cocAAAAAAAA".into());
        assert_eq!(
            resolved(&hook.validate_event(&ctx, &[], &explicit).unwrap()),
            Some("cocAAAAAAAA")
        );

        explicit.attribute_option_combo = Some("cocMISSINGA".into());
        assert_eq!(codes(&hook.validate_event(&ctx, &[], &explicit).unwrap()), vec!["E1115"]);

        explicit.attribute_option_combo = Some("cocOTHERAAA".into());
        assert_eq!(codes(&hook.validate_event(&ctx, &[], &explicit).unwrap()), vec!["E1054"]);
    }

    #[test]
    fn test_unknown_category_option() {
        let preheat = preheat();
        let bundle = TrackerBundle::default();
        let ctx = ValidationContext::new(&bundle, &preheat);

        let mut unknown = event("programAAAA");
        unknown.attribute_category_options = Some("optAAAAAAAA;optMISSINGA".into());
        let outcome = EventCategoryOptionComboValidationHook
            .validate_event(&ctx, &[], &unknown)
            .unwrap();
        assert_eq!(codes(&outcome), vec!["E1116"]);
        assert_eq!(outcome.reports[0].args, vec!["optMISSINGA"]);
    }

    #[test]
    fn test_default_fallback() {
        let preheat = preheat();
        let bundle = TrackerBundle::default();
        let ctx = ValidationContext::new(&bundle, &preheat);
        let hook = EventCategoryOptionComboValidationHook;

        let outcome = hook.validate_event(&ctx, &[], &event("programDEFA")).unwrap();
        assert!(outcome.reports.is_empty());
        assert_eq!(resolved(&outcome), Some("cocDEFAULTA"));

        let mut explicit_default = event("programDEFA");
        explicit_default.attribute_option_combo = Some("cocDEFAULTA".into());
        assert_eq!(
            resolved(&hook.validate_event(&ctx, &[], &explicit_default).unwrap()),
            Some("cocDEFAULTA")
        );

        // program with a real category combo cannot use the default
        let outcome = hook.validate_event(&ctx, &[], &event("programAAAA")).unwrap();
        assert_eq!(codes(&outcome), vec!["E1055"]);
    }

    #[test]
    fn test_explicit_combo_must_match_options() {
        let preheat = preheat();
        let bundle = TrackerBundle::default();
        let ctx = ValidationContext::new(&bundle, &preheat);

        let mut mismatch = event("programAAAA");
        mismatch.attribute_category_options = Some("optAAAAAAAA;optBBBBBBBB".into());
        mismatch.attribute_option_combo = Some("cocOTHERAAA".into());
        let outcome = EventCategoryOptionComboValidationHook
            .validate_event(&ctx, &[], &mismatch)
            .unwrap();
        assert_eq!(codes(&outcome), vec!["E1117"]);
    }

    #[test]
    fn test_resolves_uncoded_combo_by_code() {
        let mut preheat = Preheat::new();
        preheat
            .put(
                PreheatIdentifier::Code,
                IdentifiableObject::new(ObjectType::Program, "programSEXA")
                    .with_code("MORBIDITY")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccSEXAAAAAA"),
                    ),
            )
            .put(
                PreheatIdentifier::Code,
                IdentifiableObject::new(ObjectType::CategoryOption, "optMALEAAAA")
                    .with_code("MALE"),
            )
            // full class loads are indexed by UID; this combo has no code
            .put(
                PreheatIdentifier::Uid,
                IdentifiableObject::new(ObjectType::CategoryOptionCombo, "cocMALEAAAA")
                    .with_name("Male")
                    .with_reference(
                        "categoryCombo",
                        IdentifiableObject::stub(ObjectType::CategoryCombo, "ccSEXAAAAAA"),
                    )
                    .with_collection(
                        "categoryOptions",
                        vec![IdentifiableObject::stub(ObjectType::CategoryOption, "optMALEAAAA")],
                    ),
            );
        let bundle = TrackerBundle {
            identifier: PreheatIdentifier::Code,
            ..Default::default()
        };
        let ctx = ValidationContext::new(&bundle, &preheat);

        let mut by_code = event("MORBIDITY");
        by_code.attribute_category_options = Some("MALE".into());
        let outcome = EventCategoryOptionComboValidationHook
            .validate_event(&ctx, &[], &by_code)
            .unwrap();
        assert!(outcome.reports.is_empty());
        assert_eq!(resolved(&outcome), Some("cocMALEAAAA"));
    }
}
