//! Class member emission.

pub mod constructors;
pub mod functions;
