//! # SharedWAL Testkit
//!
//! Test utilities for SharedWAL.
//!
//! This crate provides:
//! - A temporary shared volume fixture with WAL directories and segments
//! - Helpers that damage control file copies the way a crash or bad disk would
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sharedwal_testkit::prelude::*;
//!
//! #[test]
//! fn reads_reform_record() {
//!     let volume = SharedVolume::new();
//!     let store = volume.control_store();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod damage;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::damage::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use damage::*;
pub use fixtures::*;
pub use generators::*;
