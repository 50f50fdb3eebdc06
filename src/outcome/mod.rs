//! Outcome translator: exit status and stderr to success or a typed failure.

mod rules;
mod translate;

pub use rules::*;
pub use translate::*;
