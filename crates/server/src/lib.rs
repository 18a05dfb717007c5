pub mod api;
pub mod bootstrap;
pub mod health;
pub mod runner;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use runner::OptimizationRunner;
