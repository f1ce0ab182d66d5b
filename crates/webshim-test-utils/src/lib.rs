#![deny(unsafe_code)]

//! Shared test utilities for the webshim workspace.
//!
//! Provides a scripted HTTP transport, config builders, file fixtures and
//! tracing helpers so that individual crate tests stay concise and
//! consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! webshim-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod tracing_setup;
pub mod transport;

pub use config::TestConfigBuilder;
pub use fixtures::TestFile;
pub use tracing_setup::init_test_tracing;
pub use transport::{MockResponse, MockTransport};
