//! Output interpreter tests.
