//! Type definitions

pub mod cluster;
pub mod entity;
pub mod location;
pub mod route;

pub use cluster::*;
pub use entity::*;
pub use location::*;
pub use route::*;
