//! Configuration and domain models shared by the storage, repository and API layers.

pub mod config;
pub mod models;
