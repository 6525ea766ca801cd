//! Validation reports
//!
//! Every problem found during tracker validation is a [`ValidationReport`]:
//! a [`ValidationCode`] plus ordered arguments, attached to one tracker
//! entity. The rendered message is derived from the code's template so
//! callers can localize from `code` + `args` instead of matching text.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{TrackerRef, TrackerType};

/// Argument list for codes whose message takes none
pub const NO_ARGS: [&str; 0] = [];

// =============================================================================
// Validation Codes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCode {
    // === Tracked entity ===
    E1005,
    E1049,

    // === Enrollment ===
    E1014,
    E1025,
    E1069,
    E1070,
    W1015,

    // === Event metadata ===
    E1010,
    E1011,
    E1013,
    E1033,
    E1034,
    E1089,

    // === Event dates ===
    E1031,
    E1042,
    E1043,
    E1047,
    E1050,

    // === Attribute option combo ===
    E1054,
    E1055,
    E1115,
    E1116,
    E1117,

    // === Data values ===
    E1303,
    E1304,
    E1305,

    // === Relationships ===
    E4000,
    E4001,
    E4006,
    E4010,
    E4011,
    E4012,

    // === General ===
    E9999,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E1005 => "E1005",
            Self::E1049 => "E1049",
            Self::E1014 => "E1014",
            Self::E1025 => "E1025",
            Self::E1069 => "E1069",
            Self::E1070 => "E1070",
            Self::W1015 => "W1015",
            Self::E1010 => "E1010",
            Self::E1011 => "E1011",
            Self::E1013 => "E1013",
            Self::E1033 => "E1033",
            Self::E1034 => "E1034",
            Self::E1089 => "E1089",
            Self::E1031 => "E1031",
            Self::E1042 => "E1042",
            Self::E1043 => "E1043",
            Self::E1047 => "E1047",
            Self::E1050 => "E1050",
            Self::E1054 => "E1054",
            Self::E1055 => "E1055",
            Self::E1115 => "E1115",
            Self::E1116 => "E1116",
            Self::E1117 => "E1117",
            Self::E1303 => "E1303",
            Self::E1304 => "E1304",
            Self::E1305 => "E1305",
            Self::E4000 => "E4000",
            Self::E4001 => "E4001",
            Self::E4006 => "E4006",
            Self::E4010 => "E4010",
            Self::E4011 => "E4011",
            Self::E4012 => "E4012",
            Self::E9999 => "E9999",
        }
    }

    /// Message template; `{0}`, `{1}`, ... are replaced by the report arguments
    pub fn template(&self) -> &'static str {
        match self {
            Self::E1005 => "Could not find TrackedEntityType: `{0}`.",
            Self::E1049 => "Could not find OrganisationUnit: `{0}`, linked to TrackedEntity.",
            Self::E1014 => {
                "Provided Program: `{0}`, is a Program without registration. \
                 An Enrollment cannot be created into Program without registration."
            }
            Self::E1025 => "Property enrolledAt is null.",
            Self::E1069 => "Could not find Program: `{0}`, linked to Enrollment.",
            Self::E1070 => "Could not find OrganisationUnit: `{0}`, linked to Enrollment.",
            Self::W1015 => "Enrollment: `{0}`, has no occurredAt date.",
            Self::E1010 => "Could not find Program: `{0}`, linked to Event.",
            Self::E1011 => "Could not find OrganisationUnit: `{0}`, linked to Event.",
            Self::E1013 => "Could not find ProgramStage: `{0}`, linked to Event.",
            Self::E1033 => "Event: `{0}`, Enrollment value is NULL.",
            Self::E1034 => "Event: `{0}`, matches more than one Enrollment: `{1}`.",
            Self::E1089 => {
                "Event: `{0}`, references a Program Stage `{1}` that does not belong to Program `{2}`."
            }
            Self::E1031 => "Event OccurredAt date is missing.",
            Self::E1042 => "Event: `{0}`, needs to have completed date.",
            Self::E1043 => {
                "Event: `{0}`, completeness date has expired. Not possible to make changes to this event."
            }
            Self::E1047 => {
                "Event: `{0}`, date belongs to an expired period. It is not possible to create such event."
            }
            Self::E1050 => "Event ScheduledAt date is missing.",
            Self::E1054 => {
                "AttributeOptionCombo `{0}` is not in the event programs category combo `{1}`."
            }
            Self::E1055 => {
                "Default AttributeOptionCombo is not allowed since program has non-default CategoryCombo."
            }
            Self::E1115 => "Could not find CategoryOptionCombo: `{0}`.",
            Self::E1116 => "Could not find CategoryOption: `{0}`.",
            Self::E1117 => {
                "CategoryOptionCombo does not exist for given category combo and category options: `{0}`."
            }
            Self::E1303 => "Mandatory DataElement `{0}` is not present.",
            Self::E1304 => "DataElement `{0}` is not a valid data element.",
            Self::E1305 => "DataElement `{0}` is not part of `{1}` program stage.",
            Self::E4000 => "Relationship: `{0}` cannot link to itself.",
            Self::E4001 => {
                "Relationship Item `{0}` for Relationship `{1}` is invalid: an Item can link only one Tracker entity."
            }
            Self::E4006 => "Could not find RelationshipType: `{0}`.",
            Self::E4010 => "Relationship Type `{0}` constraint requires a {1} but a {2} was found.",
            Self::E4011 => {
                "Relationship: `{0}` cannot be persisted because {1} {2} referenced by this relationship is not valid."
            }
            Self::E4012 => "Could not find {0}: `{1}`, linked to Relationship.",
            Self::E9999 => "Internal error in {0}: {1}",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::W1015 => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Render the template with `args`; missing arguments stay as placeholders.
    pub fn format(&self, args: &[String]) -> String {
        args.iter()
            .enumerate()
            .fold(self.template().to_string(), |message, (i, arg)| {
                message.replace(&format!("{{{}}}", i), arg)
            })
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Validation Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub tracker_type: TrackerType,
    pub uid: String,
    pub code: ValidationCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    pub message: String,
    /// Hook that produced the report, stamped by the validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

impl ValidationReport {
    pub fn new<I, S>(entity: &TrackerRef, code: ValidationCode, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.to_string()).collect();
        Self {
            tracker_type: entity.tracker_type,
            uid: entity.uid.clone(),
            message: code.format(&args),
            code,
            args,
            hook: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn entity(&self) -> TrackerRef {
        TrackerRef::new(self.tracker_type, self.uid.clone())
    }

    pub fn is_error_for(&self, tracker_type: TrackerType, uid: &str) -> bool {
        self.is_error() && self.tracker_type == tracker_type && self.uid == uid
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({} {})",
            self.code,
            self.severity(),
            self.message,
            self.tracker_type,
            self.uid
        )
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// All reports of one validation pass, in the order they were found
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationErrorReporter {
    reports: Vec<ValidationReport>,
}

impl ValidationErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, report: ValidationReport) {
        debug_assert!(report.is_error(), "{} is not an error code", report.code);
        self.reports.push(report);
    }

    pub fn add_warning(&mut self, report: ValidationReport) {
        debug_assert!(!report.is_error(), "{} is not a warning code", report.code);
        self.reports.push(report);
    }

    /// Add a report under whichever severity its code carries
    pub fn add(&mut self, report: ValidationReport) {
        if report.is_error() {
            self.add_error(report);
        } else {
            self.add_warning(report);
        }
    }

    pub fn reports(&self) -> &[ValidationReport] {
        &self.reports
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationReport> {
        self.reports.iter().filter(|r| r.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationReport> {
        self.reports.iter().filter(|r| !r.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn has_error_for(&self, tracker_type: TrackerType, uid: &str) -> bool {
        self.reports.iter().any(|r| r.is_error_for(tracker_type, uid))
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for report in &self.reports {
            output.push_str(&format!("{}\n", report));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for ValidationErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for ValidationErrorReporter {
    type Item = ValidationReport;
    type IntoIter = std::vec::IntoIter<ValidationReport>;

    fn into_iter(self) -> Self::IntoIter {
        self.reports.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrorReporter {
    type Item = &'a ValidationReport;
    type IntoIter = std::slice::Iter<'a, ValidationReport>;

    fn into_iter(self) -> Self::IntoIter {
        self.reports.iter()
    }
}
