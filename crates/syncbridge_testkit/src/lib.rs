//! # SyncBridge Testkit
//!
//! Test utilities for SyncBridge.
//!
//! This crate provides:
//! - A scripted in-memory engine transport
//! - Mock stores and a scripted client-reset integrator
//! - Error fixtures and blocking helpers
//! - Property-based test generators using proptest
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use syncbridge_testkit::prelude::*;
//!
//! #[test]
//! fn log_in_fails() {
//!     let transport = MockTransport::new();
//!     transport.script_log_in(Reply::Err(engine_error(50, "invalid password")));
//!     let app = App::new("app", transport.clone());
//!     assert!(wait(app.log_in(Credentials::Anonymous)).is_err());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod store;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::store::*;
    pub use crate::transport::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use store::*;
pub use transport::*;
