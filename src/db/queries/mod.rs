//! Database queries

pub mod agent;
pub mod entity;
pub mod location;
pub mod route_plan;
pub mod zone;
