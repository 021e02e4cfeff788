use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::{Condition, FilterWhere};
use super::types::{FieldSet, FilterOrderInfo, ListQuery, SqlParam, SqlResult};
use crate::config::FilterConfig;

/// A validated list request: WHERE tree, ORDER BY and page window.
#[derive(Debug, Clone)]
pub struct Filter {
    condition: Option<Condition>,
    order: Vec<FilterOrderInfo>,
    limit: i64,
    offset: i64,
}

impl Filter {
    /// Validate everything up front; no SQL is built from an invalid request.
    pub fn from_query(
        query: &ListQuery,
        fields: &FieldSet,
        default_limit: i64,
        config: &FilterConfig,
    ) -> Result<Self, FilterError> {
        let condition = match non_empty(&query.filter) {
            Some(raw) => FilterWhere::parse(&serde_json::from_str::<Value>(raw)?, fields)?,
            None => None,
        };

        let order = match non_empty(&query.sorts) {
            Some(raw) => FilterOrder::validate_and_parse(&serde_json::from_str::<Value>(raw)?, fields)?,
            None => vec![],
        };
        let order = FilterOrder::with_defaults(order, fields)?;

        let offset = match non_empty(&query.offset) {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| FilterError::InvalidOffset(format!("'{}' is not an integer", raw)))?,
            None => 0,
        };
        if offset < 0 {
            return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
        }

        let limit = match non_empty(&query.limit) {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| FilterError::InvalidLimit(format!("'{}' is not an integer", raw)))?,
            None => default_limit,
        };
        if limit <= 0 {
            return Err(FilterError::InvalidLimit("Limit must be positive".to_string()));
        }

        // Apply max limit from config
        let limit = if limit > config.max_limit {
            if config.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, config.max_limit);
            }
            config.max_limit
        } else {
            limit
        };

        Ok(Self {
            condition,
            order,
            limit,
            offset,
        })
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// `select` is the column list, `from` the FROM/JOIN part, `base` fixed
    /// conditions such as soft-delete exclusion.
    pub fn to_sql(&self, select: &str, from: &str, base: &[&str]) -> SqlResult {
        let where_result = self.to_where_sql(base);
        let mut params = where_result.params;

        let limit_index = params.len() + 1;
        params.push(SqlParam::Int(self.limit));
        params.push(SqlParam::Int(self.offset));

        let query = [
            format!("SELECT {}", select),
            from.to_string(),
            where_result.query,
            FilterOrder::generate(&self.order),
            format!("LIMIT ${} OFFSET ${}", limit_index, limit_index + 1),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        SqlResult { query, params }
    }

    /// `WHERE ...` (or empty) shared by the page and the count queries.
    pub fn to_where_sql(&self, base: &[&str]) -> SqlResult {
        let mut clauses: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        let mut params = vec![];
        if let Some(condition) = &self.condition {
            let (sql, values) = FilterWhere::generate(condition, 0);
            clauses.push(sql);
            params = values;
        }
        let query = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        SqlResult { query, params }
    }

    pub fn to_count_sql(&self, from: &str, base: &[&str]) -> SqlResult {
        let where_result = self.to_where_sql(base);
        let query = if where_result.query.is_empty() {
            format!("SELECT COUNT(*) {}", from)
        } else {
            format!("SELECT COUNT(*) {} {}", from, where_result.query)
        };
        SqlResult {
            query,
            params: where_result.params,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::{Field, FieldKind};

    static INSIGHT_FIELDS: FieldSet = FieldSet {
        fields: &[
            Field::new("idx", "i.idx", FieldKind::Int),
            Field::new("topic_idx", "i.topic_idx", FieldKind::Int),
            Field::new("created_at", "i.created_at", FieldKind::Timestamp),
        ],
        default_sort: "-idx",
        tiebreaker: "-idx",
    };

    fn config() -> FilterConfig {
        FilterConfig {
            max_limit: 50,
            debug_logging: false,
        }
    }

    fn query(filter: Option<&str>, sorts: Option<&str>) -> ListQuery {
        ListQuery {
            filter: filter.map(String::from),
            sorts: sorts.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn filters_by_topic_and_orders_by_created_at() {
        let q = query(Some(r#"{"topic_idx":5}"#), Some(r#"["-created_at"]"#));
        let filter = Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()).unwrap();
        let sql = filter.to_sql("i.idx", "FROM insights i", &["i.del_at IS NULL"]);
        assert_eq!(
            sql.query,
            "SELECT i.idx FROM insights i WHERE i.del_at IS NULL AND i.topic_idx = $1 ORDER BY i.created_at DESC, i.idx DESC LIMIT $2 OFFSET $3"
        );
        assert_eq!(sql.params, vec![SqlParam::Int(5), SqlParam::Int(10), SqlParam::Int(0)]);
    }

    #[test]
    fn bogus_field_fails_before_sql() {
        let q = query(Some(r#"{"bogus_field":1}"#), None);
        assert!(matches!(
            Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()),
            Err(FilterError::UnknownField(_))
        ));
    }

    #[test]
    fn count_shares_where_clause() {
        let q = query(Some(r#"{"topic_idx":"is:2"}"#), None);
        let filter = Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()).unwrap();
        let count = filter.to_count_sql("FROM insights i", &["i.del_at IS NULL"]);
        assert_eq!(count.query, "SELECT COUNT(*) FROM insights i WHERE i.del_at IS NULL AND i.topic_idx = $1");
        assert_eq!(count.params, vec![SqlParam::Int(2)]);
    }

    #[test]
    fn no_filter_no_where() {
        let filter = Filter::from_query(&ListQuery::default(), &INSIGHT_FIELDS, 10, &config()).unwrap();
        let sql = filter.to_sql("*", "FROM topics t", &[]);
        assert_eq!(sql.query, "SELECT * FROM topics t ORDER BY i.idx DESC LIMIT $1 OFFSET $2");
    }

    #[test]
    fn limit_and_offset_validation() {
        let mut q = ListQuery::default();
        q.limit = Some("0".to_string());
        assert!(matches!(Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()), Err(FilterError::InvalidLimit(_))));

        q.limit = Some("500".to_string());
        q.offset = Some("20".to_string());
        let filter = Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()).unwrap();
        assert_eq!(filter.limit(), 50);
        assert_eq!(filter.offset(), 20);

        q.offset = Some("-1".to_string());
        assert!(matches!(Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()), Err(FilterError::InvalidOffset(_))));

        q.offset = Some("abc".to_string());
        assert!(Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let q = query(Some("{not json"), None);
        assert!(matches!(
            Filter::from_query(&q, &INSIGHT_FIELDS, 10, &config()),
            Err(FilterError::JsonError(_))
        ));
    }
}
