// Library surface for the binary and integration tests.
pub mod autopilot;
pub mod choreography;
pub mod config;
pub mod delegate;
pub mod error;
pub mod hook;
pub mod prompt;
pub mod runtime;
pub mod session;
pub mod util;
