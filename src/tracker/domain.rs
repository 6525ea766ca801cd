//! Tracker import payloads
//!
//! Metadata is referenced by key strings (UIDs or codes, depending on the
//! bundle's identifier); tracker entities reference each other by UID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of tracker entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerType {
    TrackedEntity,
    Enrollment,
    Event,
    Relationship,
}

impl TrackerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerType::TrackedEntity => "TRACKED_ENTITY",
            TrackerType::Enrollment => "ENROLLMENT",
            TrackerType::Event => "EVENT",
            TrackerType::Relationship => "RELATIONSHIP",
        }
    }
}

impl fmt::Display for TrackerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kind, uid)` identity of a tracker entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRef {
    pub tracker_type: TrackerType,
    pub uid: String,
}

impl TrackerRef {
    pub fn new(tracker_type: TrackerType, uid: impl Into<String>) -> Self {
        Self {
            tracker_type,
            uid: uid.into(),
        }
    }
}

impl fmt::Display for TrackerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tracker_type, self.uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    #[default]
    Active,
    Completed,
    Visited,
    Schedule,
    Overdue,
    Skipped,
}

impl EventStatus {
    /// Not yet happened, or explicitly skipped
    pub fn is_pending(&self) -> bool {
        matches!(self, EventStatus::Schedule | EventStatus::Overdue | EventStatus::Skipped)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub tracked_entity: String,
    #[serde(default)]
    pub tracked_entity_type: Option<String>,
    #[serde(default)]
    pub org_unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub enrollment: String,
    #[serde(default)]
    pub tracked_entity: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub enrolled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    pub data_element: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl DataValue {
    pub fn new(data_element: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            data_element: data_element.into(),
            value: Some(value.into()),
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub enrollment: Option<String>,
    #[serde(default)]
    pub tracked_entity: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub program_stage: Option<String>,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attribute_option_combo: Option<String>,
    /// Semicolon-separated category option keys
    #[serde(default)]
    pub attribute_category_options: Option<String>,
    #[serde(default)]
    pub data_values: Vec<DataValue>,
}

impl Event {
    /// Category option keys, in the order given
    pub fn category_option_keys(&self) -> Vec<&str> {
        self.attribute_category_options
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// One side of a relationship; exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipItem {
    #[serde(default)]
    pub tracked_entity: Option<String>,
    #[serde(default)]
    pub enrollment: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
}

impl RelationshipItem {
    pub fn tracked_entity(uid: impl Into<String>) -> Self {
        Self {
            tracked_entity: Some(uid.into()),
            ..Default::default()
        }
    }

    pub fn enrollment(uid: impl Into<String>) -> Self {
        Self {
            enrollment: Some(uid.into()),
            ..Default::default()
        }
    }

    pub fn event(uid: impl Into<String>) -> Self {
        Self {
            event: Some(uid.into()),
            ..Default::default()
        }
    }

    fn slots(&self) -> [(TrackerType, Option<&str>); 3] {
        [
            (TrackerType::TrackedEntity, self.tracked_entity.as_deref()),
            (TrackerType::Enrollment, self.enrollment.as_deref()),
            (TrackerType::Event, self.event.as_deref()),
        ]
    }

    /// `trackedEntity:enrollment:event`, with `null` for absent slots
    pub fn canonical(&self) -> String {
        self.slots()
            .into_iter()
            .map(|(_, uid)| uid.filter(|u| !u.is_empty()).unwrap_or("null"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Exactly one of the three slots is set
    pub fn is_exclusive(&self) -> bool {
        self.canonical().split(':').filter(|slot| *slot == "null").count() == 2
    }

    /// The single entity this side points at
    pub fn target(&self) -> Option<TrackerRef> {
        if !self.is_exclusive() {
            return None;
        }
        self.slots()
            .into_iter()
            .find_map(|(kind, uid)| uid.filter(|u| !u.is_empty()).map(|u| TrackerRef::new(kind, u)))
    }
}

impl fmt::Display for RelationshipItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub relationship: String,
    #[serde(default)]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub from: RelationshipItem,
    #[serde(default)]
    pub to: RelationshipItem,
}
