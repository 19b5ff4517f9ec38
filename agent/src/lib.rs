//! Last Deploy worker library
//!
//! Git-synced Dockerfile and compose projects driven through a durable,
//! single-consumer job queue.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod projects;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
