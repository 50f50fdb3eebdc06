//! Configuration: runtime tunables and the operation catalogue.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
