//! Zone queries

use anyhow::Result;
use sqlx::PgPool;

use crate::types::ZoneSummary;

/// Zones that hold coordinate-valid prospects of the distributor, with the
/// number of those prospects not in `excluded_ids`. Largest zones first.
pub async fn list_zones_with_counts(
    pool: &PgPool,
    distributor_name: &str,
    excluded_ids: &[String],
) -> Result<Vec<ZoneSummary>> {
    let rows = sqlx::query_as::<_, (String, Option<String>, i64)>(
        r#"
        SELECT
            p.zone_code,
            z.name,
            COUNT(*) AS available
        FROM prospects p
        LEFT JOIN zones z ON z.code = p.zone_code
        WHERE p.distributor_name = $1
            AND p.zone_code IS NOT NULL
            AND p.zone_code <> ''
            AND p.latitude IS NOT NULL
            AND p.longitude IS NOT NULL
            AND p.latitude <> 0
            AND p.longitude <> 0
            AND NOT (p.tdlinx = ANY($2))
        GROUP BY p.zone_code, z.name
        ORDER BY COUNT(*) DESC, p.zone_code
        "#
    )
    .bind(distributor_name)
    .bind(excluded_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(code, name, available)| ZoneSummary { code, name, available })
        .collect())
}
