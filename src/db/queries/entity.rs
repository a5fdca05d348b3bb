//! Distributor queries

use anyhow::Result;
use sqlx::PgPool;

use crate::types::{Coordinates, Entity};

#[derive(Debug, Clone, sqlx::FromRow)]
struct DistributorRow {
    distributor_id: String,
    distributor_name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<DistributorRow> for Entity {
    fn from(row: DistributorRow) -> Self {
        Entity {
            id: row.distributor_id,
            name: row.distributor_name,
            depot: Coordinates::from_raw(row.latitude, row.longitude),
        }
    }
}

/// Look up a distributor by its exact name
pub async fn get_entity_by_name(pool: &PgPool, name: &str) -> Result<Option<Entity>> {
    let row = sqlx::query_as::<_, DistributorRow>(
        r#"
        SELECT distributor_id, distributor_name, latitude, longitude
        FROM distributors
        WHERE distributor_name = $1
        "#
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Entity::from))
}

/// Names of every distributor that has at least one prospect
pub async fn list_entity_names(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT d.distributor_name
        FROM distributors d
        JOIN prospects p ON p.distributor_name = d.distributor_name
        ORDER BY d.distributor_name
        "#
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}
