use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{Field, FieldKind, FieldSet, SqlParam};

/// Expression tree for WHERE clauses. Columns are always allow-listed
/// expressions; values are always bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals { column: &'static str, value: SqlParam },
    Like { column: &'static str, pattern: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Collapses single-member groups and drops empty ones.
    fn group(members: Vec<Condition>, and: bool) -> Option<Condition> {
        let mut members = members;
        match members.len() {
            0 => None,
            1 => members.pop(),
            _ if and => Some(Condition::And(members)),
            _ => Some(Condition::Or(members)),
        }
    }
}

pub struct FilterWhere {
    param_values: Vec<SqlParam>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Parses a `filter` object against the allow-list.
    ///
    /// `and` groups AND their fields and are ORed together, `or` groups OR
    /// their fields and are also ORed together, and the two results are
    /// ANDed. Bare top-level fields form one more AND group.
    pub fn parse(filter: &Value, fields: &FieldSet) -> Result<Option<Condition>, FilterError> {
        let obj = match filter {
            Value::Null => return Ok(None),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidFilter("filter must be a JSON object".to_string())),
        };

        let mut parts = Vec::new();
        let mut bare = Vec::new();

        for (key, value) in obj {
            match key.as_str() {
                "and" => {
                    let groups = Self::parse_groups(key, value, fields, true)?;
                    parts.extend(Condition::group(groups, false));
                }
                "or" => {
                    let groups = Self::parse_groups(key, value, fields, false)?;
                    parts.extend(Condition::group(groups, false));
                }
                field => bare.push(Self::parse_field(field, value, fields)?),
            }
        }

        parts.extend(Condition::group(bare, true));
        Ok(Condition::group(parts, true))
    }

    fn parse_groups(key: &str, value: &Value, fields: &FieldSet, and: bool) -> Result<Vec<Condition>, FilterError> {
        let arr = value
            .as_array()
            .ok_or_else(|| FilterError::InvalidFilter(format!("'{}' requires an array of objects", key)))?;

        let mut groups = Vec::with_capacity(arr.len());
        for group in arr {
            let members = Self::parse_group(key, group, fields)?;
            groups.extend(Condition::group(members, and));
        }
        Ok(groups)
    }

    fn parse_group(key: &str, group: &Value, fields: &FieldSet) -> Result<Vec<Condition>, FilterError> {
        let obj: &Map<String, Value> = group
            .as_object()
            .ok_or_else(|| FilterError::InvalidFilter(format!("'{}' groups must be objects", key)))?;
        obj.iter()
            .map(|(name, value)| Self::parse_field(name, value, fields))
            .collect()
    }

    fn parse_field(name: &str, value: &Value, fields: &FieldSet) -> Result<Condition, FilterError> {
        let field = fields
            .get(name)
            .ok_or_else(|| FilterError::UnknownField(name.to_string()))?;

        match value {
            Value::String(s) => Self::parse_expression(field, s),
            Value::Null => Err(invalid(field, "null is not a filter value")),
            Value::Array(_) | Value::Object(_) => Err(invalid(field, "expected a scalar value")),
            scalar => Ok(Condition::Equals {
                column: field.column,
                value: convert_scalar(field, scalar)?,
            }),
        }
    }

    /// `operator:value` where operator is one of `is`, `eq`, `=` or `like`.
    /// Text without a recognised prefix is an equality value.
    fn parse_expression(field: &Field, expr: &str) -> Result<Condition, FilterError> {
        let (operator, value) = match expr.split_once(':') {
            Some((op, rest)) if is_operator_token(op) => (op, rest),
            _ => ("=", expr),
        };

        match operator {
            "is" | "eq" | "=" => Ok(Condition::Equals {
                column: field.column,
                value: convert_text(field, value)?,
            }),
            "like" => {
                if field.kind != FieldKind::Text {
                    return Err(invalid(field, "like is only supported on text fields"));
                }
                Ok(Condition::Like {
                    column: field.column,
                    pattern: format!("%{}%", escape_like(value)),
                })
            }
            other => Err(FilterError::UnsupportedOperator(other.to_string())),
        }
    }

    /// Render to SQL, collecting bound values. Returns the fragment and the
    /// parameters in placeholder order.
    pub fn generate(condition: &Condition, starting_param_index: usize) -> (String, Vec<SqlParam>) {
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.render(condition);
        (sql, filter_where.param_values)
    }

    fn render(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Equals { column, value } => format!("{} = {}", column, self.param(value.clone())),
            Condition::Like { column, pattern } => {
                format!("{} LIKE {}", column, self.param(SqlParam::Text(pattern.clone())))
            }
            Condition::And(members) => self.render_group(members, " AND "),
            Condition::Or(members) => self.render_group(members, " OR "),
        }
    }

    fn render_group(&mut self, members: &[Condition], joiner: &str) -> String {
        let parts: Vec<String> = members.iter().map(|m| self.render(m)).collect();
        format!("({})", parts.join(joiner))
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

fn is_operator_token(token: &str) -> bool {
    token == "=" || (!token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic()))
}

fn invalid(field: &Field, reason: &str) -> FilterError {
    FilterError::InvalidValue {
        field: field.name.to_string(),
        reason: reason.to_string(),
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn convert_scalar(field: &Field, value: &Value) -> Result<SqlParam, FilterError> {
    match (field.kind, value) {
        (FieldKind::Int, Value::Number(n)) => n
            .as_i64()
            .map(SqlParam::Int)
            .ok_or_else(|| invalid(field, "expected an integer")),
        (FieldKind::Bool, Value::Bool(b)) => Ok(SqlParam::Bool(*b)),
        (FieldKind::Text, Value::Number(n)) => Ok(SqlParam::Text(n.to_string())),
        (FieldKind::Text, Value::Bool(b)) => Ok(SqlParam::Text(b.to_string())),
        (FieldKind::Int, _) => Err(invalid(field, "expected an integer")),
        (FieldKind::Bool, _) => Err(invalid(field, "expected a boolean")),
        (FieldKind::Timestamp, _) => Err(invalid(field, "expected an RFC 3339 timestamp or date")),
        (FieldKind::Text, _) => Err(invalid(field, "expected text")),
    }
}

fn convert_text(field: &Field, value: &str) -> Result<SqlParam, FilterError> {
    match field.kind {
        FieldKind::Text => Ok(SqlParam::Text(value.to_string())),
        FieldKind::Int => value
            .trim()
            .parse::<i64>()
            .map(SqlParam::Int)
            .map_err(|_| invalid(field, "expected an integer")),
        FieldKind::Bool => match value.trim() {
            "true" | "1" => Ok(SqlParam::Bool(true)),
            "false" | "0" => Ok(SqlParam::Bool(false)),
            _ => Err(invalid(field, "expected a boolean")),
        },
        FieldKind::Timestamp => parse_timestamp(value.trim())
            .map(SqlParam::Timestamp)
            .ok_or_else(|| invalid(field, "expected an RFC 3339 timestamp or date")),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
