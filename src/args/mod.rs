//! Argument builder: renders a typed request into an invocation.

mod builder;
mod spec;
mod vector;

pub use builder::*;
pub use spec::*;
pub use vector::*;
