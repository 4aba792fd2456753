//! Types, traits and utilities shared across the crate

pub mod channels;
pub mod errors;
pub mod running;
pub mod status;
pub mod traits;
pub mod types;
