// Core modules
pub mod api;
pub mod config;
pub mod curve;
pub mod db;
pub mod execution;
pub mod mixer;
pub mod models;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
