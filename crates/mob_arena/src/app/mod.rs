mod bootstrap;
mod input;
mod loop_runner;
mod scenario;

use mob_engine::{BestiaryError, SimError, StartupError};
use thiserror::Error;

pub(crate) use bootstrap::{build_app, init_tracing};
pub(crate) use loop_runner::run;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to load bestiary: {0}")]
    Bestiary(#[from] BestiaryError),
    #[error("failed to load scenario: {0}")]
    Scenario(#[from] scenario::ScenarioError),
    #[error("simulation rejected scenario setup: {0}")]
    Sim(#[from] SimError),
    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: &'static str, message: String },
}
