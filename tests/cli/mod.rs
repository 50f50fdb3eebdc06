//! Command-line front-end tests.
