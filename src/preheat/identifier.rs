//! Identifier strategies used to key preheated objects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PreheatError;
use crate::object::IdentifiableObject;
use crate::schema::ObjectType;

/// How references are matched to stored objects.
///
/// `Auto` indexes objects under both their UID and their code, and looks up
/// by UID before falling back to code. Identity types (users, credentials,
/// user roles) are always matched by UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PreheatIdentifier {
    #[default]
    Uid,
    Code,
    Auto,
}

impl PreheatIdentifier {
    /// Strategy actually used for `object_type`
    pub fn effective_for(self, object_type: ObjectType) -> Self {
        if object_type.is_uid_pinned() {
            PreheatIdentifier::Uid
        } else {
            self
        }
    }

    /// Concrete index buckets this strategy reads from and writes to, in lookup order
    pub fn strategies(self) -> &'static [PreheatIdentifier] {
        match self {
            PreheatIdentifier::Uid => &[PreheatIdentifier::Uid],
            PreheatIdentifier::Code => &[PreheatIdentifier::Code],
            PreheatIdentifier::Auto => &[PreheatIdentifier::Uid, PreheatIdentifier::Code],
        }
    }

    /// Key of `object` under this strategy; `None` when that key is empty.
    pub fn key_of<'a>(self, object: &'a IdentifiableObject) -> Option<&'a str> {
        let uid = Some(object.uid.as_str()).filter(|u| !u.is_empty());
        match self.effective_for(object.object_type()) {
            PreheatIdentifier::Uid => uid,
            PreheatIdentifier::Code => object.code(),
            PreheatIdentifier::Auto => uid.or_else(|| object.code()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PreheatIdentifier::Uid => "UID",
            PreheatIdentifier::Code => "CODE",
            PreheatIdentifier::Auto => "AUTO",
        }
    }
}

impl fmt::Display for PreheatIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreheatIdentifier {
    type Err = PreheatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UID" => Ok(PreheatIdentifier::Uid),
            "CODE" => Ok(PreheatIdentifier::Code),
            "AUTO" => Ok(PreheatIdentifier::Auto),
            other => Err(PreheatError::InvalidPreheatParams(format!(
                "unknown identifier scheme '{}'",
                other
            ))),
        }
    }
}
