//! The `utils` module provides the pieces shared by every other module:
//! the error types returned across module boundaries and the logging setup
//! used by the binary.

pub mod error;
pub mod logging;
