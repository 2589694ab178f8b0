pub mod config;
pub mod error;
pub mod logging;
pub mod server;

// Layered boundaries: application ports/use case, core engine, adapters
pub mod app;
pub mod engine;
pub mod infra;

// Domain data shapes shared across layers
pub mod domain;

pub mod observability;
