//! CLI argument parsing for the prospect-planner binary.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::config::PlannerConfig;
use crate::types::Coordinates;

#[derive(Parser)]
#[command(
    name = "prospect-planner",
    about = "Cluster prospect locations into day routes and assign them to field agents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Plan routes for one or more distributors
    Plan(PlanArgs),
    /// Run database migrations and exit
    Migrate,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Distributor name (repeat for several)
    #[arg(long = "distributor", required_unless_present = "all", conflicts_with = "all")]
    pub distributors: Vec<String>,

    /// Plan every distributor in the store
    #[arg(long)]
    pub all: bool,

    /// First route date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: NaiveDate,

    /// Collect rows in memory and export CSV instead of inserting
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub max_cluster_size: Option<usize>,

    #[arg(long)]
    pub min_cluster_size: Option<usize>,

    /// Zones processed concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Working days in the assignment window
    #[arg(long)]
    pub business_days: Option<usize>,

    /// Depot latitude, overrides the distributor's location
    #[arg(long, requires = "depot_lng", allow_negative_numbers = true)]
    pub depot_lat: Option<f64>,

    #[arg(long, requires = "depot_lat", allow_negative_numbers = true)]
    pub depot_lng: Option<f64>,

    /// Fill undersized clusters with nearby prospects
    #[arg(long)]
    pub top_up: bool,

    /// Route existing customers along with prospects
    #[arg(long)]
    pub include_existing: bool,

    /// Seed for agent/date sampling, for reproducible plans
    #[arg(long)]
    pub seed: Option<u64>,
}

impl PlanArgs {
    /// Apply command-line overrides on top of the environment configuration
    pub fn apply(&self, config: &mut PlannerConfig) {
        if let Some(n) = self.max_cluster_size {
            config.max_cluster_size = n;
        }
        if let Some(n) = self.min_cluster_size {
            config.min_cluster_size = n;
        }
        if let Some(n) = self.workers {
            config.max_workers = n;
        }
        if let Some(n) = self.business_days {
            config.business_days = n;
        }
        config.top_up_undersized |= self.top_up;
        config.include_existing |= self.include_existing;
    }

    pub fn depot_override(&self) -> Option<Coordinates> {
        Coordinates::from_raw(self.depot_lat, self.depot_lng)
    }
}
