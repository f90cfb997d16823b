use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod behavior;
pub mod content;
mod error;
pub mod sim;
pub mod world;

pub use behavior::{BehaviorKind, BehaviorState};
pub use content::{
    load_bestiary, parse_bestiary_str, Bestiary, BestiaryError, BestiaryErrorCode, CombatStats,
    MobDefId, MobTemplate, SourceLocation,
};
pub use error::SimError;
pub use sim::{
    mitigate_damage, ActionTimers, Capabilities, DamageSource, DropTable, Entity, EntityId,
    ItemDrop, ItemStack, Loot, MobProfile, RollRange, SimEvent, SimEventCounts, SimEventKind,
    StatusApplyOutcome, StatusEffect, StatusEffectKind, StatusPulse, BURN_EFFECT_ID,
    OUT_OF_COMBAT_SECONDS, SLOW_EFFECT_ID,
};
pub use world::{GridError, GridPos, GridWorld, OccupancyGrid, PathFinder};

pub const ROOT_ENV_VAR: &str = "MOBSIM_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub bestiary_dir: PathBuf,
    pub scenarios_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "MOBSIM_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/mob-sim\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    Ok(app_paths_at(root))
}

fn app_paths_at(root: PathBuf) -> AppPaths {
    let assets = root.join("assets");
    AppPaths {
        bestiary_dir: assets.join("bestiary"),
        scenarios_dir: assets.join("scenarios"),
        root,
    }
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("assets")).expect("mkdir");
        assert!(!is_repo_marker(temp.path()));
        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn asset_dirs_hang_off_root() {
        let paths = app_paths_at(PathBuf::from("/srv/mobsim"));
        assert_eq!(paths.bestiary_dir, PathBuf::from("/srv/mobsim/assets/bestiary"));
        assert_eq!(paths.scenarios_dir, PathBuf::from("/srv/mobsim/assets/scenarios"));
    }
}
