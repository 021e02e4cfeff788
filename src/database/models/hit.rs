use std::net::Ipv4Addr;

use serde::Serialize;
use sqlx::PgConnection;

#[derive(Debug, Clone, Serialize)]
pub struct HitCount {
    pub insight_idx: i64,
    pub hits: i64,
}

/// IPv4 address packed into the `BIGINT` column.
pub fn ip_to_column(ip: Ipv4Addr) -> i64 {
    i64::from(u32::from(ip))
}

pub async fn record(conn: &mut PgConnection, insight_idx: i64, ip: Ipv4Addr) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("INSERT INTO insight_hits (insight_idx, ip) VALUES ($1, $2) RETURNING idx")
        .bind(insight_idx)
        .bind(ip_to_column(ip))
        .fetch_one(conn)
        .await
}

pub async fn count(conn: &mut PgConnection, insight_idx: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM insight_hits WHERE insight_idx = $1")
        .bind(insight_idx)
        .fetch_one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_addresses_big_endian() {
        assert_eq!(ip_to_column(Ipv4Addr::new(127, 0, 0, 1)), 2130706433);
        assert_eq!(ip_to_column(Ipv4Addr::new(255, 255, 255, 255)), 4294967295);
        assert_eq!(ip_to_column(Ipv4Addr::UNSPECIFIED), 0);
    }
}
