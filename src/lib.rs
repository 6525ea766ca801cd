//! Metadata preheat and tracker validation
//!
//! Before an import touches the database, every metadata object the payload
//! references is loaded once into an in-memory [`Preheat`] cache, indexed by
//! UID and by code. Import payloads are then checked against that cache:
//! tracker bundles go through an ordered chain of validation hooks that
//! collect every problem instead of stopping at the first one.
//!
//! ## Flow
//!
//! ```text
//! payload ──collect_references──▶ ReferenceMap
//!                                     │
//! ObjectStore ◀──fetch──── PreheatService::preheat
//!                                     │
//!                                     ▼
//!                                  Preheat ──connect_references──▶ payload
//!                                     │
//!                     TrackerValidator::validate ──▶ ValidationResult
//! ```

pub mod config;
pub mod error;
pub mod object;
pub mod period;
pub mod preheat;
pub mod schema;
pub mod store;
pub mod tracker;

pub use config::ImportConfig;
pub use error::{PreheatError, Result};
pub use object::{IdentifiableObject, PropertyValue};
pub use period::{IsoPeriodResolver, Period, PeriodResolver, PeriodType};
pub use preheat::{
    collect_references, connect_references, Preheat, PreheatIdentifier, PreheatMode, PreheatParams,
    PreheatService, ReferenceMap,
};
pub use schema::{ObjectType, PropertyDescriptor};
pub use store::{InMemoryObjectStore, ObjectStore};
pub use tracker::{TrackerBundle, TrackerValidator, ValidationContext, ValidationResult};
