use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use mob_engine::{
    Bestiary, Capabilities, EntityId, GridPos, GridWorld, StatusEffect, StatusEffectKind,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::AppError;

pub(crate) const SCENARIO_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("read scenario '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) scenario_version: u32,
    pub(crate) area: AreaSpec,
    #[serde(default)]
    pub(crate) seed: Option<u64>,
    pub(crate) spawns: Vec<SpawnSpec>,
    #[serde(default)]
    pub(crate) targets: Vec<TargetSpec>,
    #[serde(default)]
    pub(crate) status_effects: Vec<StatusSpec>,
    #[serde(default)]
    pub(crate) clicks: Vec<ClickSpec>,
    #[serde(default)]
    pub(crate) cell_size_px: CellSize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AreaSpec {
    pub(crate) name: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SpawnSpec {
    pub(crate) def: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    pub(crate) x: i32,
    pub(crate) y: i32,
    #[serde(default)]
    pub(crate) player: bool,
    #[serde(default)]
    pub(crate) capabilities: Option<Capabilities>,
    #[serde(default)]
    pub(crate) patrol_center: Option<GridPos>,
    #[serde(default)]
    pub(crate) wandering_factor: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TargetSpec {
    pub(crate) attacker: String,
    pub(crate) target: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StatusSpec {
    pub(crate) entity: String,
    pub(crate) effect: EffectSpec,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EffectSpec {
    pub(crate) kind: StatusEffectKind,
    pub(crate) duration: f32,
    pub(crate) strength: f32,
}

/// Host click, in window pixels, delivered once the sim clock reaches `at_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ClickSpec {
    pub(crate) at_seconds: f64,
    pub(crate) x_px: f32,
    pub(crate) y_px: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CellSize {
    pub(crate) width: f32,
    pub(crate) height: f32,
}

impl Default for CellSize {
    fn default() -> Self {
        Self {
            width: 80.0,
            height: 60.0,
        }
    }
}

/// A populated world ready to tick, plus the host-side script that drives it.
#[derive(Debug)]
pub(crate) struct ScenarioWorld {
    pub(crate) world: GridWorld,
    pub(crate) player: Option<EntityId>,
    pub(crate) clicks: Vec<ClickSpec>,
    pub(crate) cell_size: CellSize,
}

pub(crate) fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = parse_scenario_json(&raw)?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

pub(crate) fn parse_scenario_json(raw: &str) -> Result<Scenario, ScenarioError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer) {
        Ok(scenario) => Ok(scenario),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(ScenarioError::Parse(format!("parse scenario json: {source}")))
            } else {
                Err(ScenarioError::Parse(format!(
                    "parse scenario json at {path}: {source}"
                )))
            }
        }
    }
}

fn validation_err(path: &str, message: impl Into<String>) -> ScenarioError {
    ScenarioError::Invalid(format!("validation failed at {path}: {}", message.into()))
}

fn expected_actual(path: &str, expected: impl Display, actual: impl Display) -> ScenarioError {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

fn require_finite(path: &str, value: f32) -> Result<(), ScenarioError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(expected_actual(path, "finite number", value))
    }
}

fn require_positive(path: &str, value: f32) -> Result<(), ScenarioError> {
    require_finite(path, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(expected_actual(path, "number > 0", value))
    }
}

pub(crate) fn validate_scenario(scenario: &Scenario) -> Result<(), ScenarioError> {
    if scenario.scenario_version != SCENARIO_VERSION {
        return Err(expected_actual(
            "scenario_version",
            SCENARIO_VERSION,
            scenario.scenario_version,
        ));
    }
    if scenario.area.width == 0 {
        return Err(expected_actual("area.width", "width > 0", 0));
    }
    if scenario.area.height == 0 {
        return Err(expected_actual("area.height", "height > 0", 0));
    }
    require_positive("cell_size_px.width", scenario.cell_size_px.width)?;
    require_positive("cell_size_px.height", scenario.cell_size_px.height)?;

    let mut names = HashMap::with_capacity(scenario.spawns.len());
    let mut players = 0usize;
    for (index, spawn) in scenario.spawns.iter().enumerate() {
        let name = spawn_name(spawn);
        if let Some(first_index) = names.insert(name, index) {
            return Err(validation_err(
                &format!("spawns[{index}].name"),
                format!("duplicate spawn name '{name}' (first seen at spawns[{first_index}])"),
            ));
        }
        if let Some(factor) = spawn.wandering_factor {
            require_finite(&format!("spawns[{index}].wandering_factor"), factor)?;
        }
        if spawn.player {
            players += 1;
        }
    }
    if players > 1 {
        return Err(expected_actual("spawns", "at most one player", players));
    }

    for (index, target) in scenario.targets.iter().enumerate() {
        for (field, name) in [("attacker", &target.attacker), ("target", &target.target)] {
            if !names.contains_key(name.as_str()) {
                return Err(validation_err(
                    &format!("targets[{index}].{field}"),
                    format!("unknown spawn '{name}'"),
                ));
            }
        }
    }
    for (index, status) in scenario.status_effects.iter().enumerate() {
        if !names.contains_key(status.entity.as_str()) {
            return Err(validation_err(
                &format!("status_effects[{index}].entity"),
                format!("unknown spawn '{}'", status.entity),
            ));
        }
        require_finite(
            &format!("status_effects[{index}].effect.duration"),
            status.effect.duration,
        )?;
        require_finite(
            &format!("status_effects[{index}].effect.strength"),
            status.effect.strength,
        )?;
    }
    for (index, click) in scenario.clicks.iter().enumerate() {
        if !click.at_seconds.is_finite() || click.at_seconds < 0.0 {
            return Err(expected_actual(
                &format!("clicks[{index}].at_seconds"),
                "finite number >= 0",
                click.at_seconds,
            ));
        }
        require_finite(&format!("clicks[{index}].x_px"), click.x_px)?;
        require_finite(&format!("clicks[{index}].y_px"), click.y_px)?;
    }
    Ok(())
}

fn spawn_name(spawn: &SpawnSpec) -> &str {
    spawn.name.as_deref().unwrap_or(spawn.def.as_str())
}

/// Spawns every entry from bestiary templates, then wires targets and status effects by spawn name.
pub(crate) fn build_world(
    scenario: &Scenario,
    bestiary: &Bestiary,
    seed: u64,
) -> Result<ScenarioWorld, AppError> {
    let mut world = GridWorld::new(
        scenario.area.name.clone(),
        scenario.area.width,
        scenario.area.height,
        seed,
    );
    let mut ids = HashMap::<&str, EntityId>::with_capacity(scenario.spawns.len());
    let mut player = None;

    for (index, spawn) in scenario.spawns.iter().enumerate() {
        let template = bestiary.template_by_name(&spawn.def).ok_or_else(|| {
            validation_err(
                &format!("spawns[{index}].def"),
                format!("unknown mob def '{}'", spawn.def),
            )
        })?;
        let name = spawn_name(spawn);
        let mut entity = template.spawn(GridPos::new(spawn.x, spawn.y));
        entity.name = name.to_string();
        if let Some(capabilities) = spawn.capabilities {
            entity.capabilities = capabilities;
        }
        if let Some(factor) = spawn.wandering_factor {
            entity.wandering_factor = factor;
        }
        if let Some(center) = spawn.patrol_center {
            let mob = entity.mob.as_mut().ok_or_else(|| {
                validation_err(
                    &format!("spawns[{index}].patrol_center"),
                    format!("mob def '{}' has no combat profile", spawn.def),
                )
            })?;
            mob.patrol_center = Some(center);
        }

        let id = world.add_entity(entity)?;
        ids.insert(name, id);
        if spawn.player {
            player = Some(id);
        }
    }

    let lookup = |path: String, name: &str| {
        ids.get(name)
            .copied()
            .ok_or_else(|| validation_err(&path, format!("unknown spawn '{name}'")))
    };
    for (index, target) in scenario.targets.iter().enumerate() {
        let attacker = lookup(format!("targets[{index}].attacker"), &target.attacker)?;
        let victim = lookup(format!("targets[{index}].target"), &target.target)?;
        world.set_target(attacker, victim)?;
    }
    for (index, status) in scenario.status_effects.iter().enumerate() {
        let id = lookup(format!("status_effects[{index}].entity"), &status.entity)?;
        let effect = StatusEffect::new(
            status.effect.kind,
            status.effect.duration,
            status.effect.strength,
        );
        world.apply_status_effect(id, effect)?;
    }

    let mut clicks = scenario.clicks.clone();
    clicks.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));

    info!(
        area = world.name(),
        width = world.width(),
        height = world.height(),
        entity_count = world.entity_count(),
        seed,
        "scenario_built"
    );
    Ok(ScenarioWorld {
        world,
        player,
        clicks,
        cell_size: scenario.cell_size_px,
    })
}
