pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod scheduler;
pub mod store;
