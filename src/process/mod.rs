//! Process supervisor: spawning, waiting, termination and output sinks.

mod capture;
mod handle;
mod registry;
mod status;
mod supervisor;

pub use capture::*;
pub use handle::*;
pub use registry::*;
pub use status::*;
pub use supervisor::*;
