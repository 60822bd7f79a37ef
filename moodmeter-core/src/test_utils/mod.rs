pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
