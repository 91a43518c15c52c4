//! Domain layer - Core types and port definitions
//!
//! This module defines the request/descriptor types exchanged with the
//! calling framework and the traits (ports) that adapters implement.

pub mod ports;

pub use ports::*;
