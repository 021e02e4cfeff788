use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Value type of an allow-listed field; filter values are converted to it
/// before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Text,
    Bool,
    Timestamp,
}

/// Public field name mapped to the SQL expression it stands for.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

/// Per-endpoint allow-list plus ordering defaults.
#[derive(Debug)]
pub struct FieldSet {
    pub fields: &'static [Field],
    /// Used when the request carries no `sorts`, e.g. `"-idx"`.
    pub default_sort: &'static str,
    /// Appended to every ORDER BY so pages are stable between calls.
    pub tiebreaker: &'static str,
}

impl FieldSet {
    pub fn get(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: &'static str,
    pub sort: SortDirection,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

/// Raw list query string. Everything stays textual until the translator has
/// validated it so that malformed input becomes a BadRequest instead of an
/// extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub offset: Option<String>,
    pub limit: Option<String>,
    pub sorts: Option<String>,
    pub filter: Option<String>,
}
