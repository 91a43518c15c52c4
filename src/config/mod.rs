//! Node Configuration
//!
//! Loading, validation and hot reload of the node → mount path / volume
//! group mapping.

pub mod canonical;
pub mod store;

pub use canonical::*;
pub use store::*;
