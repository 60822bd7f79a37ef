// src/repositories/mod.rs

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::PostgresMessageStore;
pub use moodmeter_common::traits::MessageStore;
