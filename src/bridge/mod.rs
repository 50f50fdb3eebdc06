//! Bridge call: builds, spawns, interprets and translates one operation.

mod call;
mod state;
mod stream;

pub use call::*;
pub use state::*;
pub use stream::*;
