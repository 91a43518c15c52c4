//! Volume Control Plane
//!
//! Node resolution, helper pod execution and the provision/delete lifecycle
//! built on top of them.

pub mod helper;
pub mod lifecycle;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

pub use helper::*;
pub use lifecycle::*;
pub use resolver::*;
