//! Shared configuration, errors, domain types and connection helpers.

pub mod config;
pub mod db;
pub mod error;
pub mod redis_pool;
pub mod types;
