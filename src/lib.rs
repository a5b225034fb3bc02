//! `transitway`: a local-first engine for GTFS transit data — RAPTOR-based
//! journey planning over stops, presets, and arbitrary lat/lon locations,
//! without relying on an external routing API.

pub mod config;
pub mod feed;
pub mod gtfs;
pub mod indexed;
pub mod model;
pub mod online;
pub mod presets;
pub mod raptor;
pub mod shared;
pub mod spatial;
pub mod water;
