use serde_json::Value;

use super::error::FilterError;
use super::types::{FieldSet, FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `["-created_at", "title"]` or a single `"-created_at"`.
    pub fn validate_and_parse(sorts: &Value, fields: &FieldSet) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match sorts {
            Value::Null => Ok(vec![]),
            Value::String(s) => Ok(vec![Self::parse_sort(s, fields)?]),
            Value::Array(arr) => arr
                .iter()
                .map(|v| match v {
                    Value::String(s) => Self::parse_sort(s, fields),
                    other => Err(FilterError::InvalidSorts(format!("expected field name, got {}", other))),
                })
                .collect(),
            _ => Err(FilterError::InvalidSorts("sorts must be an array of field names".to_string())),
        }
    }

    fn parse_sort(input: &str, fields: &FieldSet) -> Result<FilterOrderInfo, FilterError> {
        let (name, sort) = match input.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (input, SortDirection::Asc),
        };
        let field = fields
            .get(name)
            .ok_or_else(|| FilterError::UnknownSortField(name.to_string()))?;
        Ok(FilterOrderInfo { column: field.column, sort })
    }

    /// Falls back to the endpoint default and appends the tie-breaker so that
    /// identical requests always page identically.
    pub fn with_defaults(mut infos: Vec<FilterOrderInfo>, fields: &FieldSet) -> Result<Vec<FilterOrderInfo>, FilterError> {
        if infos.is_empty() {
            infos.push(Self::parse_sort(fields.default_sort, fields)?);
        }
        let tiebreaker = Self::parse_sort(fields.tiebreaker, fields)?;
        if !infos.iter().any(|i| i.column == tiebreaker.column) {
            infos.push(tiebreaker);
        }
        Ok(infos)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("{} {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}
