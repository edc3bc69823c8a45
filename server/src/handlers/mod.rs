//! Request handlers for the resource collections.

mod resources;

pub use resources::*;
