//! Declarative aggregated table definitions

use crate::domain::SemanticType;

/// Aggregate measure over the rows of one group
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    /// Number of rows in the group
    Count,
    /// Number of distinct non-null values
    CountDistinct(&'static str),
    /// Number of rows whose value is greater than zero
    CountPositive(&'static str),
    /// Sum of non-null values; null when every value is null
    Sum(&'static str),
    /// Mean of non-null values; null when every value is null
    Avg(&'static str),
    /// Quotient of two measures; null on a zero or null denominator
    Ratio {
        numerator: Box<Measure>,
        denominator: Box<Measure>,
    },
}

impl Measure {
    pub fn ratio(numerator: Measure, denominator: Measure) -> Self {
        Measure::Ratio {
            numerator: Box::new(numerator),
            denominator: Box::new(denominator),
        }
    }

    /// Input columns the measure reads
    pub fn inputs(&self) -> Vec<&'static str> {
        match self {
            Measure::Count => vec![],
            Measure::CountDistinct(c)
            | Measure::CountPositive(c)
            | Measure::Sum(c)
            | Measure::Avg(c) => vec![*c],
            Measure::Ratio {
                numerator,
                denominator,
            } => {
                let mut inputs = numerator.inputs();
                inputs.extend(denominator.inputs());
                inputs
            }
        }
    }
}

/// Named output measure
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureColumn {
    pub name: &'static str,
    pub measure: Measure,
}

pub fn measure(name: &'static str, measure: Measure) -> MeasureColumn {
    MeasureColumn { name, measure }
}

/// How the rows of a table are derived from its source
#[derive(Debug, Clone, PartialEq)]
pub enum TableShape {
    /// Row-level copy of the listed columns
    Project(&'static [&'static str]),
    /// One row per distinct group key
    Aggregate {
        group_by: &'static [&'static str],
        measures: Vec<MeasureColumn>,
    },
}

/// Row predicate applied to the normalized source before shaping
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableFilter {
    NotNull(&'static str),
    /// Inclusive numeric range
    Between {
        column: &'static str,
        min: f64,
        max: f64,
    },
}

/// Lookup join against the route reference relation
///
/// The looked-up column is inserted directly after the key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub key: &'static str,
    pub column: &'static str,
}

/// Explicit sort key; the full row is always appended as tie-breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: &'static str,
    pub descending: bool,
}

pub const fn asc(column: &'static str) -> SortKey {
    SortKey {
        column,
        descending: false,
    }
}

pub const fn desc(column: &'static str) -> SortKey {
    SortKey {
        column,
        descending: true,
    }
}

/// Approximate row count expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RowBand {
    pub min: usize,
    pub max: Option<usize>,
}

impl RowBand {
    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn contains(&self, rows: usize) -> bool {
        rows >= self.min && self.max.map_or(true, |max| rows <= max)
    }
}

impl std::fmt::Display for RowBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "{}..", self.min),
        }
    }
}

/// Declarative definition of one aggregated table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub source: &'static str,
    pub filters: Vec<TableFilter>,
    pub shape: TableShape,
    pub lookup: Option<Lookup>,
    pub order_by: Vec<SortKey>,
    pub row_band: RowBand,
    /// Columns that must never hold nulls
    pub key_columns: &'static [&'static str],
    /// Documented year coverage, if the table is year-keyed
    pub year_coverage: Option<(i64, i64)>,
}

impl TableDefinition {
    /// Output column type for a measure, given the source column types
    pub fn measure_type(
        measure: &Measure,
        input_type: impl Fn(&str) -> Option<SemanticType>,
    ) -> SemanticType {
        match measure {
            Measure::Count | Measure::CountDistinct(_) | Measure::CountPositive(_) => {
                SemanticType::Integer
            }
            Measure::Sum(c) => match input_type(c) {
                Some(SemanticType::Integer) => SemanticType::Integer,
                _ => SemanticType::Float,
            },
            Measure::Avg(_) | Measure::Ratio { .. } => SemanticType::Float,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_band_contains() {
        let band = RowBand::between(1, 99);
        assert!(band.contains(1));
        assert!(band.contains(99));
        assert!(!band.contains(0));
        assert!(!band.contains(100));
        assert!(RowBand::at_least(1).contains(1_000_000));
        assert_eq!(band.to_string(), "1..=99");
    }

    #[test]
    fn test_measure_inputs() {
        let rate = Measure::ratio(Measure::CountPositive("injured"), Measure::Count);
        assert_eq!(rate.inputs(), vec!["injured"]);
    }

    #[test]
    fn test_sum_keeps_integer_type() {
        let ty = |c: &str| match c {
            "killed" => Some(SemanticType::Integer),
            _ => Some(SemanticType::Float),
        };
        assert_eq!(
            TableDefinition::measure_type(&Measure::Sum("killed"), ty),
            SemanticType::Integer
        );
        assert_eq!(
            TableDefinition::measure_type(&Measure::Sum("vmt"), ty),
            SemanticType::Float
        );
        assert_eq!(
            TableDefinition::measure_type(&Measure::Avg("killed"), ty),
            SemanticType::Float
        );
    }
}
