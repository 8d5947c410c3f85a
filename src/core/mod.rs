//! Core capabilities consumed by the client: configuration, logging,
//! and time.

pub mod config;
pub mod log;
pub mod time;
