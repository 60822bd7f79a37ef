// src/lib.rs

pub mod db;
pub mod repositories;
pub mod classifier;
pub mod eventbus;
pub mod cache;
pub mod services;
pub mod tasks;
pub mod utils;
pub mod test_utils;

pub use db::Database;
pub use moodmeter_common::error::Error;
