//! ledmap - Show Control Engine
//!
//! Ties the workspace together into a running show:
//! - [`ShowContext`]: players, routing, replay and recording for one show
//! - [`StatusPublisher`]: periodic status snapshots for a control surface
//! - Logging setup shared by the command line tool

pub mod context;
pub mod error;
pub mod logging_setup;
pub mod status;

pub use context::ShowContext;
pub use error::{Result, ShowError};
pub use status::StatusPublisher;
