//! Configuration management

use std::str::FromStr;

use anyhow::{self, Context, Result};
use chrono::Weekday;

use crate::defaults::*;
use crate::error::PlanError;
use crate::types::Coordinates;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Directory dry-run CSV exports are written to
    pub export_dir: String,

    pub db_max_connections: u32,

    pub planner: PlannerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let export_dir = std::env::var("EXPORT_DIR").unwrap_or_else(|_| "output".to_string());

        let lookup = |key: &str| std::env::var(key).ok();
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        let planner = PlannerConfig::from_lookup(&lookup)?;

        Ok(Self {
            database_url,
            export_dir,
            db_max_connections,
            planner,
        })
    }
}

/// Tunables of a planning run
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    pub max_cluster_size: usize,
    /// Clusters below this size are merged into a neighbour when possible
    pub min_cluster_size: usize,
    /// Zones fetched and clustered concurrently
    pub max_workers: usize,
    pub business_days: usize,
    pub rest_day: Weekday,
    pub search_radius_km: f64,
    pub max_radius_expansions: u32,
    /// Also route existing customers, not only prospects
    pub include_existing: bool,
    /// Fill clusters still undersized after merging with nearby prospects
    pub top_up_undersized: bool,
    /// Treat a forced (possibly colliding) agent/date assignment as an error
    pub fail_on_degraded: bool,
    /// Depot used when neither the CLI nor the distributor provides one
    pub default_depot: Option<Coordinates>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            business_days: DEFAULT_BUSINESS_DAYS,
            rest_day: DEFAULT_REST_WEEKDAY,
            search_radius_km: DEFAULT_SEARCH_RADIUS_KM,
            max_radius_expansions: DEFAULT_MAX_RADIUS_EXPANSIONS,
            include_existing: false,
            top_up_undersized: false,
            fail_on_degraded: false,
            default_depot: None,
        }
    }
}

impl PlannerConfig {
    /// Build from a variable lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let depot_lat: Option<f64> = parse_opt(lookup, "DEFAULT_DEPOT_LAT")?;
        let depot_lng: Option<f64> = parse_opt(lookup, "DEFAULT_DEPOT_LNG")?;
        if depot_lat.is_some() != depot_lng.is_some() {
            anyhow::bail!("DEFAULT_DEPOT_LAT and DEFAULT_DEPOT_LNG must be set together");
        }

        let config = Self {
            max_cluster_size: parse_or(lookup, "MAX_CLUSTER_SIZE", defaults.max_cluster_size)?,
            min_cluster_size: parse_or(lookup, "MIN_CLUSTER_SIZE", defaults.min_cluster_size)?,
            max_workers: parse_or(lookup, "MAX_WORKERS", defaults.max_workers)?,
            business_days: parse_or(lookup, "BUSINESS_DAYS", defaults.business_days)?,
            rest_day: parse_or(lookup, "REST_WEEKDAY", defaults.rest_day)?,
            search_radius_km: parse_or(lookup, "SEARCH_RADIUS_KM", defaults.search_radius_km)?,
            max_radius_expansions: parse_or(lookup, "MAX_RADIUS_EXPANSIONS", defaults.max_radius_expansions)?,
            include_existing: parse_flag(lookup, "INCLUDE_EXISTING_CUSTOMERS")?,
            top_up_undersized: parse_flag(lookup, "TOP_UP_UNDERSIZED")?,
            fail_on_degraded: parse_flag(lookup, "FAIL_ON_DEGRADED_ASSIGNMENT")?,
            default_depot: Coordinates::from_raw(depot_lat, depot_lng),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.max_cluster_size < 1 {
            return Err(PlanError::InvalidConfig("max cluster size must be at least 1".into()));
        }
        // Stop numbers run 1..=max_cluster_size and must stay below the sentinel
        if self.max_cluster_size >= UNSEQUENCED_STOP_NUMBER as usize {
            return Err(PlanError::InvalidConfig(format!(
                "max cluster size {} must be below {}",
                self.max_cluster_size, UNSEQUENCED_STOP_NUMBER
            )));
        }
        if self.min_cluster_size > self.max_cluster_size {
            return Err(PlanError::InvalidConfig(format!(
                "min cluster size {} exceeds max cluster size {}",
                self.min_cluster_size, self.max_cluster_size
            )));
        }
        if self.max_workers < 1 {
            return Err(PlanError::InvalidConfig("worker count must be at least 1".into()));
        }
        if !(self.search_radius_km > 0.0) {
            return Err(PlanError::InvalidConfig("search radius must be positive".into()));
        }
        if self.business_days == 0 {
            return Err(PlanError::InvalidConfig("business days must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
        _ => Ok(None),
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

/// true/false, 1/0, yes/no; unset is false
fn parse_flag<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("Invalid {}='{}': expected true or false", key, other),
    }
}
