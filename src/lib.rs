pub mod auth;
pub mod config;
pub mod courses;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod memory;
pub mod models;
pub mod notify;
pub mod progress;
pub mod repo;
