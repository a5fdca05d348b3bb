//! Prospect and customer location queries
//!
//! Prospects and customers live in tables with different column names; both
//! are normalized into `LocationRecord` right here.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use sqlx::{PgConnection, PgPool};

use crate::services::geo::BoundingBox;
use crate::types::{Coordinates, LocationKind, LocationRecord};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProspectRow {
    tdlinx: String,
    store_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    zone_code: Option<String>,
}

impl From<ProspectRow> for LocationRecord {
    fn from(row: ProspectRow) -> Self {
        LocationRecord {
            name: row.store_name.unwrap_or_default(),
            coordinates: Coordinates::from_raw(row.latitude, row.longitude),
            zone_code: row.zone_code.unwrap_or_default(),
            kind: LocationKind::Prospect,
            id: row.tdlinx,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CustomerRow {
    cust_no: String,
    name: Option<String>,
    zone_code: Option<String>,
}

impl From<CustomerRow> for LocationRecord {
    fn from(row: CustomerRow) -> Self {
        LocationRecord {
            name: row.name.unwrap_or_default(),
            // Resolved separately through the coordinate cache
            coordinates: None,
            zone_code: row.zone_code.unwrap_or_default(),
            kind: LocationKind::Existing,
            id: row.cust_no,
        }
    }
}

/// Every id that already has a recorded visit
pub async fn list_visited_ids(pool: &PgPool) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT cust_id FROM customer_visits")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Coordinate-valid prospects of one distributor zone
pub async fn list_zone_prospects(
    conn: &mut PgConnection,
    distributor_name: &str,
    zone_code: &str,
    excluded_ids: &[String],
) -> Result<Vec<LocationRecord>> {
    let rows = sqlx::query_as::<_, ProspectRow>(
        r#"
        SELECT tdlinx, store_name, latitude, longitude, zone_code
        FROM prospects
        WHERE zone_code = $1
            AND distributor_name = $2
            AND latitude IS NOT NULL
            AND longitude IS NOT NULL
            AND latitude <> 0
            AND longitude <> 0
            AND NOT (tdlinx = ANY($3))
        ORDER BY tdlinx
        "#
    )
    .bind(zone_code)
    .bind(distributor_name)
    .bind(excluded_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(LocationRecord::from)
        .filter(LocationRecord::is_coordinate_valid)
        .collect())
}

/// Existing customers of one distributor zone, without coordinates
pub async fn list_zone_customers(
    conn: &mut PgConnection,
    distributor_id: &str,
    zone_code: &str,
    excluded_ids: &[String],
) -> Result<Vec<LocationRecord>> {
    let rows = sqlx::query_as::<_, CustomerRow>(
        r#"
        SELECT cust_no, name, zone_code
        FROM customers
        WHERE distributor_id = $1
            AND zone_code = $2
            AND NOT (cust_no = ANY($3))
        ORDER BY cust_no
        "#
    )
    .bind(distributor_id)
    .bind(zone_code)
    .bind(excluded_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(LocationRecord::from).collect())
}

/// Coordinates of customers by id. Customers without usable coordinates are left out.
pub async fn lookup_customer_coordinates(
    pool: &PgPool,
    ids: &[String],
) -> Result<HashMap<String, Coordinates>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(String, Option<f64>, Option<f64>)> = sqlx::query_as(
        "SELECT cust_no, latitude, longitude FROM customers WHERE cust_no = ANY($1)"
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, lat, lng)| Coordinates::from_raw(lat, lng).map(|c| (id, c)))
        .collect())
}

/// Prospects inside a bounding box, optionally restricted to one zone
pub async fn candidates_in_box(
    pool: &PgPool,
    bbox: &BoundingBox,
    zone_code: Option<&str>,
    excluded_ids: &[String],
) -> Result<Vec<LocationRecord>> {
    let rows = sqlx::query_as::<_, ProspectRow>(
        r#"
        SELECT tdlinx, store_name, latitude, longitude, zone_code
        FROM prospects
        WHERE latitude BETWEEN $1 AND $2
            AND longitude BETWEEN $3 AND $4
            AND latitude <> 0
            AND longitude <> 0
            AND ($5::text IS NULL OR zone_code = $5)
            AND NOT (tdlinx = ANY($6))
        ORDER BY tdlinx
        "#
    )
    .bind(bbox.min_lat)
    .bind(bbox.max_lat)
    .bind(bbox.min_lng)
    .bind(bbox.max_lng)
    .bind(zone_code)
    .bind(excluded_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(LocationRecord::from)
        .filter(LocationRecord::is_coordinate_valid)
        .collect())
}
