//! cli-bridge - Typed calls over command-line tools.
//!
//! A request is rendered into an argument vector, run as a supervised child
//! process, and its output and exit status are turned back into a typed
//! result, a typed event stream, or a classified failure.

pub mod args;
pub mod bridge;
pub mod config;
pub mod display;
pub mod error;
pub mod outcome;
pub mod output;
pub mod pattern;
pub mod process;

pub use bridge::{Bridge, BridgeStream, CallOptions, Outcome, StreamSummary};
pub use error::{BridgeError, ErrorKind};
