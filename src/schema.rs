//! Object types and their property descriptors
//!
//! Every metadata type the preheat understands is a variant of [`ObjectType`].
//! Each type carries a statically registered descriptor table listing its
//! reference-valued and scalar properties; the collector and connector walk
//! this table instead of reflecting over live objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PreheatError;

/// Concrete type tag of a metadata object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    DataElement,
    DataElementGroup,
    CategoryOption,
    Category,
    CategoryCombo,
    CategoryOptionCombo,
    OrganisationUnit,
    Program,
    ProgramStage,
    ProgramStageDataElement,
    RelationshipType,
    TrackedEntityType,
    Attribute,
    User,
    UserCredentials,
    UserAuthorityGroup,
}

impl ObjectType {
    pub const ALL: [ObjectType; 16] = [
        ObjectType::DataElement,
        ObjectType::DataElementGroup,
        ObjectType::CategoryOption,
        ObjectType::Category,
        ObjectType::CategoryCombo,
        ObjectType::CategoryOptionCombo,
        ObjectType::OrganisationUnit,
        ObjectType::Program,
        ObjectType::ProgramStage,
        ObjectType::ProgramStageDataElement,
        ObjectType::RelationshipType,
        ObjectType::TrackedEntityType,
        ObjectType::Attribute,
        ObjectType::User,
        ObjectType::UserCredentials,
        ObjectType::UserAuthorityGroup,
    ];

    /// Types that have a single system-wide "default" instance.
    pub const DEFAULT_ELIGIBLE: [ObjectType; 4] = [
        ObjectType::Category,
        ObjectType::CategoryOption,
        ObjectType::CategoryCombo,
        ObjectType::CategoryOptionCombo,
    ];

    pub fn is_default_eligible(&self) -> bool {
        Self::DEFAULT_ELIGIBLE.contains(self)
    }

    /// Identity types always round-trip by UID, whatever strategy was requested.
    pub fn is_uid_pinned(&self) -> bool {
        matches!(
            self,
            ObjectType::User | ObjectType::UserCredentials | ObjectType::UserAuthorityGroup
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::DataElement => "DataElement",
            ObjectType::DataElementGroup => "DataElementGroup",
            ObjectType::CategoryOption => "CategoryOption",
            ObjectType::Category => "Category",
            ObjectType::CategoryCombo => "CategoryCombo",
            ObjectType::CategoryOptionCombo => "CategoryOptionCombo",
            ObjectType::OrganisationUnit => "OrganisationUnit",
            ObjectType::Program => "Program",
            ObjectType::ProgramStage => "ProgramStage",
            ObjectType::ProgramStageDataElement => "ProgramStageDataElement",
            ObjectType::RelationshipType => "RelationshipType",
            ObjectType::TrackedEntityType => "TrackedEntityType",
            ObjectType::Attribute => "Attribute",
            ObjectType::User => "User",
            ObjectType::UserCredentials => "UserCredentials",
            ObjectType::UserAuthorityGroup => "UserAuthorityGroup",
        }
    }

    /// Collection name used in metadata export documents
    pub fn plural(&self) -> &'static str {
        match self {
            ObjectType::DataElement => "dataElements",
            ObjectType::DataElementGroup => "dataElementGroups",
            ObjectType::CategoryOption => "categoryOptions",
            ObjectType::Category => "categories",
            ObjectType::CategoryCombo => "categoryCombos",
            ObjectType::CategoryOptionCombo => "categoryOptionCombos",
            ObjectType::OrganisationUnit => "organisationUnits",
            ObjectType::Program => "programs",
            ObjectType::ProgramStage => "programStages",
            ObjectType::ProgramStageDataElement => "programStageDataElements",
            ObjectType::RelationshipType => "relationshipTypes",
            ObjectType::TrackedEntityType => "trackedEntityTypes",
            ObjectType::Attribute => "attributes",
            ObjectType::User => "users",
            ObjectType::UserCredentials => "userCredentials",
            ObjectType::UserAuthorityGroup => "userRoles",
        }
    }

    pub fn from_plural(plural: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.plural() == plural)
    }

    /// Static descriptor table for this type
    pub fn properties(&self) -> &'static [PropertyDescriptor] {
        match self {
            ObjectType::DataElement => DATA_ELEMENT,
            ObjectType::DataElementGroup => DATA_ELEMENT_GROUP,
            ObjectType::CategoryOption => CATEGORY_OPTION,
            ObjectType::Category => CATEGORY,
            ObjectType::CategoryCombo => CATEGORY_COMBO,
            ObjectType::CategoryOptionCombo => CATEGORY_OPTION_COMBO,
            ObjectType::OrganisationUnit => ORGANISATION_UNIT,
            ObjectType::Program => PROGRAM,
            ObjectType::ProgramStage => PROGRAM_STAGE,
            ObjectType::ProgramStageDataElement => PROGRAM_STAGE_DATA_ELEMENT,
            ObjectType::RelationshipType => RELATIONSHIP_TYPE,
            ObjectType::TrackedEntityType => TRACKED_ENTITY_TYPE,
            ObjectType::Attribute => ATTRIBUTE,
            ObjectType::User => USER,
            ObjectType::UserCredentials => USER_CREDENTIALS,
            ObjectType::UserAuthorityGroup => USER_AUTHORITY_GROUP,
        }
    }

    pub fn property(&self, name: &str) -> Option<&'static PropertyDescriptor> {
        self.properties().iter().find(|p| p.name == name)
    }

    /// Persisted reference and collection properties (what the collector follows)
    pub fn reference_properties(&self) -> impl Iterator<Item = &'static PropertyDescriptor> {
        self.properties()
            .iter()
            .filter(|p| p.persisted && p.kind.target().is_some())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = PreheatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s) || t.plural() == s)
            .ok_or_else(|| PreheatError::UnknownObjectType(s.to_string()))
    }
}

/// Shape of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Plain JSON value (string, number, bool, nested document)
    Scalar,
    /// To-one reference to another identifiable object
    Reference(ObjectType),
    /// To-many collection of identifiable objects
    Collection(ObjectType),
}

impl PropertyKind {
    pub fn target(&self) -> Option<ObjectType> {
        match self {
            PropertyKind::Scalar => None,
            PropertyKind::Reference(t) | PropertyKind::Collection(t) => Some(*t),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, PropertyKind::Collection(_))
    }
}

/// One entry in a type's descriptor table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
    /// Computed / inverse-side properties are not persisted and never followed
    pub persisted: bool,
    pub compulsory: bool,
    pub translatable: bool,
}

impl PropertyDescriptor {
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Scalar,
            persisted: true,
            compulsory: false,
            translatable: false,
        }
    }

    pub const fn reference(name: &'static str, target: ObjectType) -> Self {
        Self {
            name,
            kind: PropertyKind::Reference(target),
            persisted: true,
            compulsory: false,
            translatable: false,
        }
    }

    pub const fn collection(name: &'static str, target: ObjectType) -> Self {
        Self {
            name,
            kind: PropertyKind::Collection(target),
            persisted: true,
            compulsory: false,
            translatable: false,
        }
    }

    pub const fn computed(mut self) -> Self {
        self.persisted = false;
        self
    }

    pub const fn compulsory(mut self) -> Self {
        self.compulsory = true;
        self
    }

    pub const fn translatable(mut self) -> Self {
        self.translatable = true;
        self
    }
}

use ObjectType as T;
use PropertyDescriptor as P;

// `href` is a link rendered by the web layer; it is listed so the table is
// complete, but it is never persisted.
const HREF: P = P::scalar("href").computed();

static DATA_ELEMENT: &[P] = &[
    HREF,
    P::scalar("shortName").compulsory().translatable(),
    P::scalar("formName").translatable(),
    P::scalar("valueType").compulsory(),
    P::scalar("domainType").compulsory(),
    P::scalar("aggregationType"),
    P::scalar("attributeValues"),
    P::reference("categoryCombo", T::CategoryCombo),
    P::reference("user", T::User),
    P::collection("dataElementGroups", T::DataElementGroup).computed(),
];

static DATA_ELEMENT_GROUP: &[P] = &[
    HREF,
    P::scalar("shortName").compulsory().translatable(),
    P::scalar("attributeValues"),
    P::collection("members", T::DataElement),
    P::reference("user", T::User),
];

static CATEGORY_OPTION: &[P] = &[
    HREF,
    P::scalar("shortName").translatable(),
    P::scalar("startDate"),
    P::scalar("endDate"),
    P::collection("organisationUnits", T::OrganisationUnit),
    P::collection("categories", T::Category).computed(),
];

static CATEGORY: &[P] = &[
    HREF,
    P::scalar("dataDimensionType").compulsory(),
    P::collection("categoryOptions", T::CategoryOption),
    P::collection("categoryCombos", T::CategoryCombo).computed(),
];

static CATEGORY_COMBO: &[P] = &[
    HREF,
    P::scalar("dataDimensionType").compulsory(),
    P::scalar("skipTotal"),
    P::collection("categories", T::Category),
    P::collection("categoryOptionCombos", T::CategoryOptionCombo).computed(),
];

static CATEGORY_OPTION_COMBO: &[P] = &[
    HREF,
    P::scalar("ignoreApproval"),
    P::reference("categoryCombo", T::CategoryCombo),
    P::collection("categoryOptions", T::CategoryOption),
];

static ORGANISATION_UNIT: &[P] = &[
    HREF,
    P::scalar("shortName").compulsory().translatable(),
    P::scalar("openingDate").compulsory(),
    P::scalar("path"),
    P::scalar("level").computed(),
    P::reference("parent", T::OrganisationUnit),
];

static PROGRAM: &[P] = &[
    HREF,
    P::scalar("shortName").compulsory().translatable(),
    P::scalar("programType").compulsory(),
    P::scalar("completeEventsExpiryDays"),
    P::scalar("expiryPeriodType"),
    P::scalar("expiryDays"),
    P::reference("categoryCombo", T::CategoryCombo),
    P::reference("trackedEntityType", T::TrackedEntityType),
    P::collection("programStages", T::ProgramStage),
    P::collection("organisationUnits", T::OrganisationUnit),
];

static PROGRAM_STAGE: &[P] = &[
    HREF,
    P::scalar("repeatable"),
    P::scalar("description").translatable(),
    P::reference("program", T::Program),
    P::collection("programStageDataElements", T::ProgramStageDataElement),
];

static PROGRAM_STAGE_DATA_ELEMENT: &[P] = &[
    P::scalar("compulsory"),
    P::scalar("sortOrder"),
    P::reference("dataElement", T::DataElement),
];

static RELATIONSHIP_TYPE: &[P] = &[
    HREF,
    P::scalar("fromConstraint").compulsory(),
    P::scalar("toConstraint").compulsory(),
    P::scalar("bidirectional"),
    P::scalar("fromToName").translatable(),
    P::scalar("toFromName").translatable(),
];

static TRACKED_ENTITY_TYPE: &[P] = &[
    HREF,
    P::scalar("description").translatable(),
    P::scalar("allowAuditLog"),
];

static ATTRIBUTE: &[P] = &[
    HREF,
    P::scalar("valueType").compulsory(),
    P::scalar("mandatory"),
    P::scalar("unique"),
    P::scalar("objectTypes"),
];

static USER: &[P] = &[
    HREF,
    P::scalar("firstName").compulsory(),
    P::scalar("surname").compulsory(),
    P::scalar("email"),
    P::reference("userCredentials", T::UserCredentials),
    P::collection("organisationUnits", T::OrganisationUnit),
];

static USER_CREDENTIALS: &[P] = &[
    P::scalar("username").compulsory(),
    P::scalar("disabled"),
    P::collection("userRoles", T::UserAuthorityGroup),
];

static USER_AUTHORITY_GROUP: &[P] = &[
    HREF,
    P::scalar("description"),
    P::scalar("authorities"),
    P::collection("users", T::User).computed(),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_eligible_set_is_fixed() {
        let eligible: Vec<_> = ObjectType::ALL
            .into_iter()
            .filter(|t| t.is_default_eligible())
            .collect();
        assert_eq!(eligible.len(), 4);
        assert!(ObjectType::CategoryOptionCombo.is_default_eligible());
        assert!(!ObjectType::DataElement.is_default_eligible());
    }

    #[test]
    fn test_uid_pinned_types() {
        assert!(ObjectType::User.is_uid_pinned());
        assert!(ObjectType::UserCredentials.is_uid_pinned());
        assert!(ObjectType::UserAuthorityGroup.is_uid_pinned());
        assert!(!ObjectType::Program.is_uid_pinned());
    }

    #[test]
    fn test_reference_properties_skip_computed_and_scalars() {
        let names: Vec<_> = ObjectType::DataElement
            .reference_properties()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["categoryCombo", "user"]);
    }

    #[test]
    fn test_plural_lookup() {
        for t in ObjectType::ALL {
            assert_eq!(ObjectType::from_plural(t.plural()), Some(t));
        }
        assert_eq!("dataElements".parse::<ObjectType>().unwrap(), ObjectType::DataElement);
        assert_eq!("program".parse::<ObjectType>().unwrap(), ObjectType::Program);
        assert!("widget".parse::<ObjectType>().is_err());
    }
}
