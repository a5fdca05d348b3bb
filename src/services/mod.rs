//! Planning services

pub mod assignment;
pub mod cache;
pub mod cluster_merge;
pub mod clustering;
pub mod export;
pub mod geo;
pub mod geo_search;
pub mod pipeline;
pub mod sequencing;
