use std::env;
use std::path::{Path, PathBuf};

use mob_engine::{load_bestiary, resolve_app_paths};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::loop_runner::LoopConfig;
use super::scenario::{build_world, load_scenario, ScenarioWorld};
use super::AppError;

const SCENARIO_ENV_VAR: &str = "MOBSIM_SCENARIO";
const SEED_ENV_VAR: &str = "MOBSIM_SEED";
const DEFAULT_SCENARIO: &str = "forest.json";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) setup: ScenarioWorld,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    info!("=== Mob Arena Startup ===");

    let paths = resolve_app_paths()?;
    let bestiary = load_bestiary(&paths.bestiary_dir)?;
    let scenario_path =
        resolve_scenario_path(&paths.scenarios_dir, env::var(SCENARIO_ENV_VAR).ok());
    let scenario = load_scenario(&scenario_path)?;
    info!(
        path = %scenario_path.display(),
        spawns = scenario.spawns.len(),
        clicks = scenario.clicks.len(),
        "scenario_loaded"
    );

    let defaults = LoopConfig::default();
    let seed = parse_seed(env::var(SEED_ENV_VAR).ok().as_deref())?
        .or(scenario.seed)
        .unwrap_or(defaults.seed);
    let setup = build_world(&scenario, &bestiary, seed)?;

    Ok(AppWiring {
        config: LoopConfig { seed, ..defaults },
        setup,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Bare file names resolve inside the scenarios directory; anything with a separator is a path.
fn resolve_scenario_path(scenarios_dir: &Path, raw: Option<String>) -> PathBuf {
    let raw = raw
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    let candidate = PathBuf::from(&raw);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        candidate
    } else {
        scenarios_dir.join(candidate)
    }
}

fn parse_seed(raw: Option<&str>) -> Result<Option<u64>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(Some)
        .map_err(|error| AppError::InvalidEnv {
            var: SEED_ENV_VAR,
            message: format!("'{raw}' is not a u64 seed: {error}"),
        })
}
