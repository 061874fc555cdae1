//! Fyvio Simulation - Backend connections for development and testing.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! Real backend sessions are provisioned outside this repository. This crate
//! provides stand-ins that implement [`fyvio_core::BackendConnection`]:
//!
//! - [`InMemoryConnection`]: media held in memory, with access denial and
//!   fault injection for exercising error paths
//! - [`LocalLibraryConnection`]: a directory of files exposed as a channel,
//!   for running the gateway locally against real media

pub mod in_memory;
pub mod local_library;

pub use in_memory::{InMemoryConnection, MediaFixture, SimulatedFault};
pub use local_library::{LibraryEntry, LibraryError, LocalLibrary, LocalLibraryConnection};
