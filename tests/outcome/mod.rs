//! Outcome translator tests.

mod translate_test;
