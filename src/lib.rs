pub mod analyzer;
pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod materializer;
pub mod models;
pub mod scheduler;
