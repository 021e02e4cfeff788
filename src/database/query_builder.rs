use sqlx::{
    encode::Encode,
    postgres::{PgArguments, PgRow},
    Arguments, FromRow, PgConnection, Postgres, Type,
};

use crate::filter::{Filter, SqlParam};
use crate::types::Patch;

/// Bind translator output in placeholder order.
pub fn to_arguments(params: &[SqlParam]) -> PgArguments {
    let mut args = PgArguments::default();
    for param in params {
        match param {
            SqlParam::Int(v) => args.add(*v),
            SqlParam::Text(v) => args.add(v.clone()),
            SqlParam::Bool(v) => args.add(*v),
            SqlParam::Timestamp(v) => args.add(*v),
        }
    }
    args
}

/// Shape of one list query: column list, FROM/JOIN part and fixed conditions.
pub struct ListSource<'a> {
    pub select: &'a str,
    pub from: &'a str,
    pub base: &'a [&'a str],
}

/// Fetch one page plus the total row count for the same WHERE clause.
pub async fn fetch_page<T>(
    conn: &mut PgConnection,
    filter: &Filter,
    source: &ListSource<'_>,
) -> Result<(Vec<T>, i64), sqlx::Error>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let page = filter.to_sql(source.select, source.from, source.base);
    let rows = sqlx::query_as_with::<_, T, _>(&page.query, to_arguments(&page.params))
        .fetch_all(&mut *conn)
        .await?;

    let count = filter.to_count_sql(source.from, source.base);
    let total = sqlx::query_scalar_with::<_, i64, _>(&count.query, to_arguments(&count.params))
        .fetch_one(&mut *conn)
        .await?;

    Ok((rows, total))
}

/// Dynamic `UPDATE ... SET` for partial updates. Column names are static;
/// every value is bound.
pub struct UpdateBuilder {
    table: &'static str,
    assignments: Vec<String>,
    args: PgArguments,
    param_index: usize,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            assignments: vec![],
            args: PgArguments::default(),
            param_index: 0,
        }
    }

    pub fn set<T>(&mut self, column: &'static str, value: T) -> &mut Self
    where
        T: Encode<'static, Postgres> + Type<Postgres> + Send + 'static,
    {
        self.args.add(value);
        self.param_index += 1;
        self.assignments.push(format!("{} = ${}", column, self.param_index));
        self
    }

    /// Assign a SQL expression such as `now()`.
    pub fn set_expr(&mut self, column: &'static str, expr: &'static str) -> &mut Self {
        self.assignments.push(format!("{} = {}", column, expr));
        self
    }

    pub fn set_opt<T>(&mut self, column: &'static str, value: Option<T>) -> &mut Self
    where
        T: Encode<'static, Postgres> + Type<Postgres> + Send + 'static,
    {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    pub fn patch<T>(&mut self, column: &'static str, patch: Patch<T>) -> &mut Self
    where
        T: Encode<'static, Postgres> + Type<Postgres> + Send + 'static,
    {
        match patch {
            Patch::Unchanged => self,
            Patch::Clear => self.set(column, Option::<T>::None),
            Patch::Set(value) => self.set(column, Some(value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Finish with `WHERE <key_column> = <key>` plus an optional fixed
    /// condition.
    pub fn build(mut self, key_column: &'static str, key: i64, extra: Option<&'static str>) -> (String, PgArguments) {
        self.args.add(key);
        self.param_index += 1;
        let mut query = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            self.table,
            self.assignments.join(", "),
            key_column,
            self.param_index
        );
        if let Some(extra) = extra {
            query.push_str(" AND ");
            query.push_str(extra);
        }
        (query, self.args)
    }

    pub async fn execute(
        self,
        conn: &mut PgConnection,
        key_column: &'static str,
        key: i64,
        extra: Option<&'static str>,
    ) -> Result<u64, sqlx::Error> {
        if self.is_empty() {
            return Ok(0);
        }
        let (query, args) = self.build(key_column, key, extra);
        let result = sqlx::query_with(&query, args).execute(conn).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_numbered_assignments() {
        let mut update = UpdateBuilder::new("insights");
        update
            .set("title", "New".to_string())
            .patch("edited_by", Patch::Set(3_i64))
            .patch("thumbnail", Patch::<String>::Unchanged)
            .set_expr("edited_at", "now()");
        let (query, _) = update.build("idx", 9, Some("del_at IS NULL"));
        assert_eq!(
            query,
            "UPDATE insights SET title = $1, edited_by = $2, edited_at = now() WHERE idx = $3 AND del_at IS NULL"
        );
    }

    #[test]
    fn clear_binds_null() {
        let mut update = UpdateBuilder::new("users");
        update.patch("avatar", Patch::<String>::Clear);
        assert!(!update.is_empty());
        let (query, _) = update.build("idx", 1, None);
        assert_eq!(query, "UPDATE users SET avatar = $1 WHERE idx = $2");
    }

    #[test]
    fn untouched_builder_is_empty() {
        let mut update = UpdateBuilder::new("users");
        update.patch("bio", Patch::<String>::Unchanged).set_opt("first_name", Option::<String>::None);
        assert!(update.is_empty());
    }
}
