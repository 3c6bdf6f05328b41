//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sync engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for progress and completion reporting
//!
//! ## Overview
//!
//! This crate holds the pieces every other engine crate leans on: the
//! validated [`CoreConfig`](config::CoreConfig), the `tracing` setup, and the
//! broadcast [`EventBus`](events::EventBus) that replaces progress callbacks.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
