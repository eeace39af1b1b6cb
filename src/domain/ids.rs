//! Identifier newtypes
//!
//! Source and table identifiers double as file names and SQL identifiers, so
//! both are restricted to lowercase snake case.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn check_identifier(kind: &str, id: &str) -> Result<(), String> {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        Some(_) => return Err(format!("{kind} '{id}' must start with a lowercase letter")),
        None => return Err(format!("{kind} cannot be empty")),
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(format!(
            "{kind} '{id}' may only contain lowercase letters, digits and underscores"
        ));
    }
    if id.len() > 48 {
        return Err(format!("{kind} '{id}' is longer than 48 characters"));
    }
    Ok(())
}

/// Raw source identifier
///
/// # Examples
///
/// ```
/// use corridor::domain::ids::SourceId;
///
/// let id = SourceId::new("transit_ridership").unwrap();
/// assert_eq!(id.as_str(), "transit_ridership");
/// assert!(SourceId::new("Transit Ridership").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

impl SourceId {
    /// Creates a new SourceId, validating the identifier format
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        check_identifier("Source ID", &id)?;
        Ok(Self(id))
    }

    /// Returns the source ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Aggregated table identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Creates a new TableName, validating the identifier format
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        check_identifier("Table name", &name)?;
        Ok(Self(name))
    }

    /// Returns the table name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the staging table used while publishing to a database
    pub fn staging_name(&self) -> String {
        format!("{}__staging", self.0)
    }
}

/// Identifier of one build run, also used as the generation directory name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildId(String);

impl BuildId {
    /// Generates a build id ordered by start time
    pub fn generate(started_at: chrono::DateTime<chrono::Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", started_at.format("%Y%m%dT%H%M%SZ"), &suffix[..8]))
    }

    /// Returns the build ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_id_traits {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_id_traits!(SourceId);
impl_id_traits!(TableName);
impl_id_traits!(BuildId);

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl FromStr for TableName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for TableName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

impl From<String> for BuildId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("transit_ridership" ; "snake case")]
    #[test_case("vmt_pems" ; "short")]
    #[test_case("route_reference" ; "reference table")]
    fn test_valid_identifiers(id: &str) {
        assert!(SourceId::new(id).is_ok());
        assert!(TableName::new(id).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("1table" ; "leading digit")]
    #[test_case("vmt; DROP TABLE x" ; "sql injection")]
    #[test_case("Vmt" ; "uppercase")]
    #[test_case("vmt\"trends" ; "quote")]
    fn test_invalid_identifiers(id: &str) {
        assert!(SourceId::new(id).is_err());
        assert!(TableName::new(id).is_err());
    }

    #[test]
    fn test_staging_name() {
        let name = TableName::new("vmt_trends").unwrap();
        assert_eq!(name.staging_name(), "vmt_trends__staging");
    }

    #[test]
    fn test_build_id_sorts_by_time() {
        let earlier = BuildId::generate(
            chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        );
        let later = BuildId::generate(
            chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        );
        assert!(earlier < later);
        assert!(earlier.as_str().starts_with("20240101T000000Z-"));
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<TableName, _> = serde_json::from_str("\"Bad Name\"");
        assert!(result.is_err());
    }
}
