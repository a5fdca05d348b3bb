//! Sales agent queries

use anyhow::Result;
use sqlx::PgPool;

use crate::types::Agent;

/// Access level of agents that can be given routes
const ACTIVE_AGENT_ACCESS: i32 = 15;

#[derive(Debug, Clone, sqlx::FromRow)]
struct AgentRow {
    code: String,
    name: String,
    territory: Option<String>,
}

/// Agents whose territory belongs to the distributor
pub async fn list_agents_for_entity(pool: &PgPool, distributor_id: &str) -> Result<Vec<Agent>> {
    let rows = sqlx::query_as::<_, AgentRow>(
        r#"
        SELECT sa.code, sa.name, sa.territory
        FROM sales_agents sa
        INNER JOIN agent_territories t ON t.territory = sa.territory
        WHERE sa.access = $1
            AND t.distributor_id = $2
        ORDER BY sa.code
        "#
    )
    .bind(ACTIVE_AGENT_ACCESS)
    .bind(distributor_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Agent {
            id: row.code,
            name: row.name,
            territory: row.territory.unwrap_or_default(),
        })
        .collect())
}
