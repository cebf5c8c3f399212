//! Data-access services over the record store.

pub mod appointments;
pub mod clients;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod mapping;
pub mod mutation;
pub mod notify;
pub mod repos;
