//! Declarative source adapter specifications

use crate::domain::{RawFormat, SemanticType};

/// A canonical column and the raw column names it may be read from
///
/// The first alias present in the raw snapshot wins. An empty alias list
/// means the raw name equals the canonical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

impl SourceColumn {
    /// Candidate raw names in lookup order
    pub fn raw_names(&self) -> Vec<&'static str> {
        if self.aliases.is_empty() {
            vec![self.name]
        } else {
            self.aliases.to_vec()
        }
    }

    /// Raw name reported when the column is missing
    pub fn primary_raw_name(&self) -> &'static str {
        self.aliases.first().copied().unwrap_or(self.name)
    }
}

/// Required column read under its own name
pub const fn required(name: &'static str) -> SourceColumn {
    SourceColumn {
        name,
        aliases: &[],
        required: true,
    }
}

/// Required column renamed from one of `aliases`
pub const fn renamed(name: &'static str, aliases: &'static [&'static str]) -> SourceColumn {
    SourceColumn {
        name,
        aliases,
        required: true,
    }
}

/// Optional column; filled with nulls when no alias is present
pub const fn optional(name: &'static str, aliases: &'static [&'static str]) -> SourceColumn {
    SourceColumn {
        name,
        aliases,
        required: false,
    }
}

/// Explicit marker mapping for boolean reconstruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolMapping {
    pub truthy: &'static [&'static str],
    pub falsy: &'static [&'static str],
    /// Value used for null or absent cells; `None` keeps them null
    pub absent: Option<bool>,
}

impl BoolMapping {
    /// Y/1/true versus N/0/false, absent treated as false
    pub const FLAG: BoolMapping = BoolMapping {
        truthy: &["Y", "y", "1", "true", "TRUE", "True", "T", "t", "yes", "Yes", "YES"],
        falsy: &["N", "n", "0", "false", "FALSE", "False", "F", "f", "no", "No", "NO"],
        absent: Some(false),
    };

    pub fn map(&self, raw: &str) -> Option<bool> {
        let raw = raw.trim();
        if self.truthy.contains(&raw) {
            Some(true)
        } else if self.falsy.contains(&raw) {
            Some(false)
        } else {
            None
        }
    }
}

/// Row filter applied during normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Drop rows where the column is null
    RequireNonNull(&'static str),

    /// Keep only rows whose dimension columns equal the canonical values
    ///
    /// Covers both multi-series category filters and EAV total slices. The
    /// audit records totals of `measure` before and after.
    KeepSlice {
        dimensions: &'static [(&'static str, &'static str)],
        measure: &'static str,
    },
}

/// One ordered normalization step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeStep {
    /// Replace literal sentinel strings with true nulls in every text cell
    NullMarkers(&'static [&'static str]),

    /// Coerce a text column; failures become null and are recorded
    Cast {
        column: &'static str,
        to: SemanticType,
    },

    /// Reconstruct a boolean column from explicit markers
    Boolean {
        column: &'static str,
        mapping: BoolMapping,
    },

    /// Derive an integer year column from a date or timestamp column
    DeriveYear {
        from: &'static str,
        into: &'static str,
    },

    /// Replace a date column with the first day of its month
    TruncateToMonth(&'static str),

    Filter(RowFilter),

    /// Remove helper columns that should not reach aggregation
    Drop(&'static [&'static str]),
}

/// Normalization rules for one source
///
/// Column resolution (renames and pruning of everything not listed) happens
/// first, followed by `steps` in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAdapterSpec {
    pub source_id: &'static str,
    pub format: RawFormat,
    pub columns: Vec<SourceColumn>,
    pub steps: Vec<NormalizeStep>,
}

impl SourceAdapterSpec {
    /// Raw snapshot file name under the raw directory
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.source_id, self.format.extension())
    }
}
