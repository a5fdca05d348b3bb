use chrono::Weekday;

/// Stop number persisted for locations without coordinates
pub const UNSEQUENCED_STOP_NUMBER: i32 = 100;

pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 60;
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 20;
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Roughly one calendar month once the rest days are skipped
pub const DEFAULT_BUSINESS_DAYS: usize = 26;
pub const DEFAULT_REST_WEEKDAY: Weekday = Weekday::Sun;

pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 5.0;
pub const DEFAULT_MAX_RADIUS_EXPANSIONS: u32 = 3;

/// Samples per cluster before falling back to a forced (agent, date) pair
pub const MAX_ASSIGNMENT_ATTEMPTS: usize = 1000;

pub const MAX_KMEANS_ITERATIONS: usize = 100;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
