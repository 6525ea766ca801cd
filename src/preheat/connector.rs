//! Reference connection
//!
//! Replaces stub references with the preheated objects they point at.
//! Unresolved references stay in place as stubs (collections keep every
//! member, in order); reporting them is left to validation.

use std::sync::Arc;
use std::ops::AddAssign;

use tracing::{debug, trace};

use crate::object::{IdentifiableObject, PropertyValue};

use super::{Preheat, PreheatIdentifier};

/// Counts of references swapped for preheated objects vs. left as they were
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectSummary {
    pub resolved: usize,
    pub unresolved: usize,
}

impl AddAssign for ConnectSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.resolved += rhs.resolved;
        self.unresolved += rhs.unresolved;
    }
}

fn resolve(
    preheat: &Preheat,
    identifier: PreheatIdentifier,
    reference: &Arc<IdentifiableObject>,
    summary: &mut ConnectSummary,
) -> Option<Arc<IdentifiableObject>> {
    let found = preheat.get_object(identifier, reference).or_else(|| {
        preheat
            .is_default(reference)
            .then(|| preheat.default_for(reference.object_type()))
            .flatten()
    });

    match found {
        Some(object) => {
            summary.resolved += 1;
            Some(Arc::clone(object))
        }
        None => {
            trace!(
                object_type = %reference.object_type(),
                uid = %reference.uid,
                "reference not found in preheat"
            );
            summary.unresolved += 1;
            None
        }
    }
}

/// Connect the persisted references of one object in place
pub fn connect_references(
    object: &mut IdentifiableObject,
    preheat: &Preheat,
    identifier: PreheatIdentifier,
) -> ConnectSummary {
    let mut summary = ConnectSummary::default();

    for property in object.object_type().reference_properties() {
        match object.properties.get_mut(property.name) {
            Some(PropertyValue::Reference(target)) => {
                if let Some(resolved) = resolve(preheat, identifier, target, &mut summary) {
                    *target = resolved;
                }
            }
            Some(PropertyValue::Collection(members)) => {
                for member in members.iter_mut() {
                    if let Some(resolved) = resolve(preheat, identifier, member, &mut summary) {
                        *member = resolved;
                    }
                }
            }
            _ => {}
        }
    }

    summary
}

/// Connect every object in a bag
pub fn connect_all(
    objects: &mut [IdentifiableObject],
    preheat: &Preheat,
    identifier: PreheatIdentifier,
) -> ConnectSummary {
    let mut summary = ConnectSummary::default();
    for object in objects.iter_mut() {
        summary += connect_references(object, preheat, identifier);
    }
    debug!(
        objects = objects.len(),
        resolved = summary.resolved,
        unresolved = summary.unresolved,
        "connected references"
    );
    summary
}
