//! Postbox host API library.
//!
//! Exposes config, state, error handling, routes and the demo handler set so
//! integration tests and the binary entrypoint can both access them.

pub mod app;
pub mod config;
pub mod demo;
pub mod error;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
