//! Route plan persistence

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info};

use crate::types::RoutePlanEntry;

/// Width of `route_plan_entries.name`
const NAME_WIDTH: usize = 15;
/// Width of the other text columns
const TEXT_WIDTH: usize = 50;

/// 12 binds per row keeps each statement well under the 65535 bind limit
const ROWS_PER_STATEMENT: usize = 1000;

/// Cut a string to at most `width` characters
fn fit(value: &str, width: usize) -> String {
    value.chars().take(width).collect()
}

/// Insert all rows in a single transaction.
///
/// Either every row is committed or none is: on any failure the transaction
/// is rolled back and the error is returned.
pub async fn insert_route_plan(pool: &PgPool, rows: &[RoutePlanEntry]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted: u64 = 0;

    for chunk in rows.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO route_plan_entries (
                location_id, route_date, name, weekday, territory, agent_id,
                route_name, distributor_id, route_code, stop_no, location_kind, zone_code
            ) ",
        );

        builder.push_values(chunk, |mut b, row| {
            b.push_bind(fit(&row.location_id, TEXT_WIDTH))
                .push_bind(row.route_date)
                .push_bind(fit(&row.name, NAME_WIDTH))
                .push_bind(row.weekday as i32)
                .push_bind(fit(&row.territory, TEXT_WIDTH))
                .push_bind(fit(&row.agent_id, TEXT_WIDTH))
                .push_bind(fit(&row.route_name, TEXT_WIDTH))
                .push_bind(fit(&row.entity_id, TEXT_WIDTH))
                .push_bind(fit(&row.route_code, TEXT_WIDTH))
                .push_bind(row.stop_no.as_i32())
                .push_bind(row.kind.as_str())
                .push_bind(fit(&row.zone_code, TEXT_WIDTH));
        });

        match builder.build().execute(&mut *tx).await {
            Ok(result) => inserted += result.rows_affected(),
            Err(e) => {
                error!("Route plan insert failed after {} rows, rolling back: {}", inserted, e);
                tx.rollback().await?;
                return Err(e.into());
            }
        }
    }

    tx.commit().await?;
    info!("Inserted {} route plan rows", inserted);
    Ok(inserted)
}
