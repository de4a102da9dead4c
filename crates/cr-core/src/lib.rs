//! cr-core: configuration, logging and command implementations for the
//! `chatreplay` binary. Exposed as a library for integration testing.

pub mod app;
pub mod config;
pub mod logging;
