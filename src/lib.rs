//! Client and appointment data layer: typed views over a hosted table
//! backend, a single-flight query cache and refetch-on-write mutations.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
