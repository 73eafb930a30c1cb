//! Application layer: builds the component graph and owns the background
//! tasks.

pub mod lifecycle;

pub use lifecycle::Guardian;
