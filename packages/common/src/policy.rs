#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-project rule determining which of a person's submissions count as
/// "their" submissions during dependency resolution.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in
/// SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "PascalCase")]
pub enum SubmissionPolicy {
    /// Only the most recent submission counts.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Latest"))]
    Latest,
    /// Every submission counts.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "All"))]
    All,
    /// Student-selected subset. Declared but not resolvable; resolution
    /// fails loud with a typed error.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Multiple"))]
    Multiple,
}

impl SubmissionPolicy {
    /// All possible policy values.
    pub const ALL: &'static [SubmissionPolicy] = &[Self::Latest, Self::All, Self::Multiple];

    /// Returns the string representation (PascalCase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "Latest",
            Self::All => "All",
            Self::Multiple => "Multiple",
        }
    }
}

impl fmt::Display for SubmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self::Latest
    }
}

/// Who a dependency edge draws producer submissions from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "PascalCase")]
pub enum DependencyStructure {
    /// The consuming student's own submissions to the producer project.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Own"))]
    Own,
    /// The course instructor's submissions to the producer project.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Instructor"))]
    Instructor,
    /// The instructor's plus every enrolled student's submissions.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Clique"))]
    Clique,
    /// Administrator-curated (student, producer) pairs. Declared but not
    /// resolvable; resolution fails loud with a typed error.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Custom"))]
    Custom,
}

impl DependencyStructure {
    /// All possible structure values.
    pub const ALL: &'static [DependencyStructure] =
        &[Self::Own, Self::Instructor, Self::Clique, Self::Custom];

    /// Returns the string representation (PascalCase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "Own",
            Self::Instructor => "Instructor",
            Self::Clique => "Clique",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for DependencyStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid policy or structure string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    invalid: String,
    valid: &'static str,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid value '{}'. Valid values: {}",
            self.invalid, self.valid
        )
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for SubmissionPolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Latest" => Ok(Self::Latest),
            "All" => Ok(Self::All),
            "Multiple" => Ok(Self::Multiple),
            _ => Err(ParseEnumError {
                invalid: s.to_string(),
                valid: "Latest, All, Multiple",
            }),
        }
    }
}

impl FromStr for DependencyStructure {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Own" => Ok(Self::Own),
            "Instructor" => Ok(Self::Instructor),
            "Clique" => Ok(Self::Clique),
            "Custom" => Ok(Self::Custom),
            _ => Err(ParseEnumError {
                invalid: s.to_string(),
                valid: "Own, Instructor, Clique, Custom",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_roundtrip() {
        for policy in SubmissionPolicy::ALL {
            let json = serde_json::to_string(policy).unwrap();
            let parsed: SubmissionPolicy = serde_json::from_str(&json).unwrap();
            assert_eq!(*policy, parsed);
        }
        for structure in DependencyStructure::ALL {
            let json = serde_json::to_string(structure).unwrap();
            let parsed: DependencyStructure = serde_json::from_str(&json).unwrap();
            assert_eq!(*structure, parsed);
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "Latest".parse::<SubmissionPolicy>().unwrap(),
            SubmissionPolicy::Latest
        );
        assert!("Newest".parse::<SubmissionPolicy>().is_err());
        assert_eq!(
            "Clique".parse::<DependencyStructure>().unwrap(),
            DependencyStructure::Clique
        );
        assert!("Everyone".parse::<DependencyStructure>().is_err());
    }
}
