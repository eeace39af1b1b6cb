//! Filter validation and predicate building
//!
//! Filter values only ever travel as bound parameters. Keys are checked
//! against the fixed key set and the view's own filter list before anything
//! else happens.

use super::views::{FilterKey, ViewDefinition, MODES};
use crate::domain::{Column, QueryError, Row, Value};
use std::collections::BTreeMap;

/// Accepted year range for `year_min` / `year_max`
pub const YEAR_BOUNDS: (i64, i64) = (1900, 2100);

/// Longest accepted text filter value
pub const MAX_TEXT_FILTER_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    AtLeast,
    AtMost,
}

impl Comparison {
    fn sql(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::AtLeast => ">=",
            Comparison::AtMost => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: &'static str,
    pub op: Comparison,
    pub value: Value,
}

impl Condition {
    /// Nulls never satisfy a condition, as in SQL
    pub fn matches(&self, cell: &Value) -> bool {
        if cell.is_null() {
            return false;
        }
        let ord = cell.cmp(&self.value);
        match self.op {
            Comparison::Equal => ord.is_eq(),
            Comparison::AtLeast => ord.is_ge(),
            Comparison::AtMost => ord.is_le(),
        }
    }
}

/// Conjunction of conditions with their bound values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub conditions: Vec<Condition>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Bound values, in placeholder order
    pub fn params(&self) -> Vec<&Value> {
        self.conditions.iter().map(|c| &c.value).collect()
    }

    /// Predicate text with `$n` placeholders numbered from `first`
    pub fn to_sql(&self, first: usize) -> String {
        if self.conditions.is_empty() {
            return "TRUE".to_string();
        }
        self.conditions
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} {} ${}", quote_ident(c.column), c.op.sql(), first + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Evaluates against an in-memory row
    ///
    /// A condition on a column the row does not have is unsatisfiable.
    pub fn matches(&self, columns: &[Column], row: &Row) -> bool {
        self.conditions.iter().all(|condition| {
            columns
                .iter()
                .position(|c| c.name == condition.column)
                .and_then(|idx| row.get(idx))
                .is_some_and(|cell| condition.matches(cell))
        })
    }
}

/// Double-quotes a catalog identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn invalid(key: FilterKey, reason: impl Into<String>) -> QueryError {
    QueryError::InvalidValue {
        filter: key.as_str().to_string(),
        reason: reason.into(),
    }
}

fn parse_year(key: FilterKey, raw: &str) -> Result<i64, QueryError> {
    let year: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(key, format!("'{raw}' is not a year")))?;
    let (min, max) = YEAR_BOUNDS;
    if !(min..=max).contains(&year) {
        return Err(invalid(key, format!("{year} is outside {min}..={max}")));
    }
    Ok(year)
}

/// Text filter value; `None` means "no constraint" (empty or `All`)
fn parse_text(key: FilterKey, raw: &str) -> Result<Option<String>, QueryError> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    if value.chars().count() > MAX_TEXT_FILTER_LEN {
        return Err(invalid(
            key,
            format!("longer than {MAX_TEXT_FILTER_LEN} characters"),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid(key, "contains control characters"));
    }
    Ok(Some(value.to_string()))
}

/// Validates `filters` against the view and builds its predicate
///
/// # Errors
///
/// Returns [`QueryError::UnknownFilter`] for keys outside the fixed set,
/// [`QueryError::UnsupportedFilter`] for keys the view does not accept and
/// [`QueryError::InvalidValue`] for values that fail to parse.
pub fn build_predicate(
    view: &ViewDefinition,
    filters: &BTreeMap<String, String>,
) -> Result<Predicate, QueryError> {
    let mut parsed: BTreeMap<FilterKey, &str> = BTreeMap::new();
    for (key, value) in filters {
        let filter =
            FilterKey::parse(key).ok_or_else(|| QueryError::UnknownFilter(key.clone()))?;
        if !view.accepts(filter) {
            return Err(QueryError::UnsupportedFilter {
                view: view.name.to_string(),
                filter: key.clone(),
            });
        }
        parsed.insert(filter, value.as_str());
    }

    let mut predicate = Predicate::default();

    if view.accepts(FilterKey::YearMin) {
        let (default_min, default_max) = view.default_years.unwrap_or(YEAR_BOUNDS);
        let year_min = match parsed.get(&FilterKey::YearMin) {
            Some(raw) => parse_year(FilterKey::YearMin, raw)?,
            None => default_min,
        };
        let year_max = match parsed.get(&FilterKey::YearMax) {
            Some(raw) => parse_year(FilterKey::YearMax, raw)?,
            None => default_max,
        };
        if year_min > year_max {
            return Err(invalid(
                FilterKey::YearMin,
                format!("year_min {year_min} is after year_max {year_max}"),
            ));
        }
        predicate = predicate
            .and(Condition {
                column: "year",
                op: Comparison::AtLeast,
                value: Value::Int(year_min),
            })
            .and(Condition {
                column: "year",
                op: Comparison::AtMost,
                value: Value::Int(year_max),
            });
    }

    for (key, raw) in &parsed {
        match key {
            FilterKey::YearMin | FilterKey::YearMax => {}
            FilterKey::Mode => {
                let Some(mode) = parse_text(*key, raw)? else {
                    continue;
                };
                let mode = mode.to_ascii_lowercase();
                let flag = MODES
                    .iter()
                    .find(|(name, _)| *name == mode)
                    .map(|(_, flag)| *flag)
                    .ok_or_else(|| {
                        let names: Vec<&str> = MODES.iter().map(|(name, _)| *name).collect();
                        invalid(*key, format!("expected one of {}", names.join(", ")))
                    })?;
                predicate = predicate.and(Condition {
                    column: flag,
                    op: Comparison::Equal,
                    value: Value::Bool(true),
                });
            }
            _ => {
                let Some(value) = parse_text(*key, raw)? else {
                    continue;
                };
                if let Some(column) = view.filter_column(*key) {
                    predicate = predicate.and(Condition {
                        column,
                        op: Comparison::Equal,
                        value: Value::Text(value),
                    });
                }
            }
        }
    }

    Ok(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::views::view_definition;
    use crate::domain::SemanticType;
    use test_case::test_case;

    fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_apply_year_range() {
        let view = view_definition("vmt").unwrap();
        let predicate = build_predicate(&view, &BTreeMap::new()).unwrap();
        assert_eq!(predicate.to_sql(1), "\"year\" >= $1 AND \"year\" <= $2");
        assert_eq!(predicate.params(), vec![&Value::Int(2013), &Value::Int(2024)]);
    }

    #[test]
    fn test_values_are_bound_never_inlined() {
        let view = view_definition("vmt").unwrap();
        let hostile = "AM'; DROP TABLE vmt_trends; --";
        let predicate = build_predicate(&view, &filters(&[("peak", hostile)])).unwrap();
        let sql = predicate.to_sql(1);
        assert!(!sql.contains("DROP"));
        assert_eq!(sql, "\"year\" >= $1 AND \"year\" <= $2 AND \"peak\" = $3");
        assert_eq!(predicate.params()[2], &Value::Text(hostile.to_string()));
    }

    #[test]
    fn test_mode_selects_flag_column() {
        let view = view_definition("collision_detail").unwrap();
        let predicate = build_predicate(&view, &filters(&[("mode", "Bicycle")])).unwrap();
        let flag = predicate.conditions.last().unwrap();
        assert_eq!(flag.column, "is_bicycle");
        assert_eq!(flag.value, Value::Bool(true));
    }

    #[test]
    fn test_all_means_unconstrained() {
        let view = view_definition("flex_fleet").unwrap();
        let predicate =
            build_predicate(&view, &filters(&[("location", "All"), ("category", "")])).unwrap();
        assert!(predicate.is_empty());
        assert_eq!(predicate.to_sql(1), "TRUE");
    }

    #[test_case("limit", "5" ; "unknown key")]
    #[test_case("year_min; DROP TABLE x", "2020" ; "hostile key")]
    fn test_unknown_filter_rejected(key: &str, value: &str) {
        let view = view_definition("vmt").unwrap();
        let err = build_predicate(&view, &filters(&[(key, value)])).unwrap_err();
        assert_eq!(err, QueryError::UnknownFilter(key.to_string()));
    }

    #[test]
    fn test_unsupported_filter_rejected() {
        let view = view_definition("youth_pass_trends").unwrap();
        let err = build_predicate(&view, &filters(&[("year_min", "2020")])).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedFilter { .. }));
    }

    #[test_case("year_min", "twenty" ; "not a number")]
    #[test_case("year_min", "1850" ; "too early")]
    #[test_case("year_max", "3000" ; "too late")]
    #[test_case("year_min", "2020 OR 1=1" ; "injection attempt")]
    fn test_invalid_year_rejected(key: &str, value: &str) {
        let view = view_definition("ridership_trends").unwrap();
        let err = build_predicate(&view, &filters(&[(key, value)])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { .. }));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let view = view_definition("ridership_trends").unwrap();
        let err = build_predicate(&view, &filters(&[("year_min", "2024"), ("year_max", "2020")]))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let view = view_definition("collision_detail").unwrap();
        let err = build_predicate(&view, &filters(&[("mode", "scooter")])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { .. }));
    }

    #[test]
    fn test_in_memory_match() {
        let columns = vec![
            Column::new("year", SemanticType::Integer),
            Column::new("peak", SemanticType::Text),
        ];
        let view = view_definition("vmt").unwrap();
        let predicate = build_predicate(
            &view,
            &filters(&[("year_min", "2020"), ("year_max", "2021"), ("peak", "AM")]),
        )
        .unwrap();
        assert!(predicate.matches(&columns, &vec![Value::Int(2020), Value::Text("AM".into())]));
        assert!(!predicate.matches(&columns, &vec![Value::Int(2022), Value::Text("AM".into())]));
        assert!(!predicate.matches(&columns, &vec![Value::Int(2020), Value::Null]));
    }
}
