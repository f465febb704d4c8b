//! Core domain + application logic for the elastic voice-channel pool manager.
//!
//! This crate is intentionally framework-agnostic. The chat platform, the
//! word-list service and durable storage live behind ports (traits); the
//! Discord / HTTP implementations live in adapter crates.

pub mod config;
pub mod controller;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod names;
pub mod pool;
pub mod ports;
pub mod store;
pub mod voice_state;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
