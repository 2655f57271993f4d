//! Core library for tracking alchemy, fishing and tombola dailies across
//! store accounts, game logins and characters.

pub mod accounts;
mod activity;
pub mod alchemy;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod error;
pub mod file_utils;
pub mod fishing;
pub mod importer;
pub mod models;
pub mod status;
pub mod timer;
pub mod tombola;

pub use config::AppConfig;
pub use database::Database;
pub use error::{Result, TrackerError};
pub use status::{Status, StatusMap};
