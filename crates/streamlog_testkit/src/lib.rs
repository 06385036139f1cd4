//! # Streamlog Testkit
//!
//! Test utilities for streamlog.
//!
//! This crate provides:
//! - Stream fixtures with reopen and simulated-crash helpers
//! - A fault-injecting record store wrapper
//! - A crash recovery harness with a mirrored expected-state model
//! - Property-based test generators using proptest
//! - Cross-crate integration scenarios
//!
//! ## Usage
//!
//! ```rust
//! use streamlog_testkit::prelude::*;
//!
//! let stream = TestStream::memory();
//! stream.write(0, b"hello").unwrap();
//! let reopened = stream.reopen().unwrap();
//! assert_eq!(reopened.tail_and_version().unwrap().0, 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fault;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use crash::*;
pub use fault::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
