//! Output interpreter: batch parsing and streaming event production.

mod batch;
mod extract;
mod strategy;
mod stream;

pub use batch::*;
pub use extract::*;
pub use strategy::*;
pub use stream::*;
