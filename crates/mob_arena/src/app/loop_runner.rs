use std::process::ExitCode;
use std::time::Duration;

use mob_engine::{EntityId, GridWorld, SimEvent};
use tracing::{debug, error, info, warn};

use super::bootstrap::AppWiring;
use super::input::{apply_click, screen_to_cell};
use super::scenario::{CellSize, ClickSpec, ScenarioWorld};
use super::AppError;

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    /// Simulated time to run, not wall-clock time.
    pub(crate) run_duration: Duration,
    pub(crate) max_ticks: u64,
    pub(crate) metrics_log_interval_ticks: u32,
    pub(crate) seed: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 20,
            run_duration: Duration::from_secs(60),
            max_ticks: 100_000,
            metrics_log_interval_ticks: 20,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RunOutcome {
    pub(crate) ticks: u64,
    pub(crate) sim_seconds: f64,
    pub(crate) survivors: usize,
    pub(crate) deaths: u32,
    pub(crate) gold: u32,
    pub(crate) experience: u32,
    pub(crate) items_dropped: u32,
    pub(crate) clicks_applied: u32,
    /// `None` when the scenario has no player.
    pub(crate) player_alive: Option<bool>,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring { config, mut setup } = app;
    match run_simulation(&config, &mut setup) {
        Ok(outcome) => {
            info!(
                ticks = outcome.ticks,
                sim_seconds = outcome.sim_seconds,
                survivors = outcome.survivors,
                deaths = outcome.deaths,
                gold = outcome.gold,
                experience = outcome.experience,
                items_dropped = outcome.items_dropped,
                clicks_applied = outcome.clicks_applied,
                player_alive = ?outcome.player_alive,
                "run_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "simulation_failed");
            ExitCode::FAILURE
        }
    }
}

/// Headless fixed-step loop: scripted clicks due at the current sim time are delivered first,
/// then the world advances one tick.
pub(crate) fn run_simulation(
    config: &LoopConfig,
    setup: &mut ScenarioWorld,
) -> Result<RunOutcome, AppError> {
    let target_tps = config.target_tps.max(1);
    let fixed_dt = 1.0 / target_tps as f32;
    let planned_ticks = (config.run_duration.as_secs_f64() * target_tps as f64).ceil() as u64;
    let tick_budget = planned_ticks.min(config.max_ticks);
    let metrics_interval = u64::from(config.metrics_log_interval_ticks.max(1));
    info!(
        target_tps,
        tick_budget,
        metrics_log_interval_ticks = metrics_interval,
        seed = config.seed,
        "loop_config"
    );

    let mut outcome = RunOutcome {
        player_alive: setup.player.map(|_| true),
        ..RunOutcome::default()
    };
    let mut next_click = 0usize;
    let mut interval_events = 0u64;

    for tick in 1..=tick_budget {
        while let Some(click) = setup.clicks.get(next_click).copied() {
            if click.at_seconds > setup.world.now_seconds() {
                break;
            }
            next_click += 1;
            if deliver_click(&mut setup.world, setup.player, click, setup.cell_size) {
                outcome.clicks_applied += 1;
            }
        }

        setup.world.tick(fixed_dt)?;
        outcome.ticks = tick;
        record_tick(&setup.world, &mut outcome);
        interval_events += u64::from(setup.world.last_tick_counts().total);

        if tick % metrics_interval == 0 {
            info!(
                tick,
                sim_seconds = setup.world.now_seconds(),
                entity_count = setup.world.entity_count(),
                events = interval_events,
                deaths = outcome.deaths,
                "loop_metrics"
            );
            interval_events = 0;
        }

        if let Some(player) = setup.player {
            if !setup.world.is_live(player) {
                info!(tick, sim_seconds = setup.world.now_seconds(), "player_died");
                outcome.player_alive = Some(false);
                break;
            }
        }
    }

    outcome.sim_seconds = setup.world.now_seconds();
    outcome.survivors = setup.world.entity_count();
    Ok(outcome)
}

fn record_tick(world: &GridWorld, outcome: &mut RunOutcome) {
    for event in world.last_tick_events() {
        if let SimEvent::EntityDied { entity_id, loot } = event {
            outcome.deaths += 1;
            outcome.gold = outcome.gold.saturating_add(loot.gold);
            outcome.experience = outcome.experience.saturating_add(loot.experience);
            outcome.items_dropped = outcome
                .items_dropped
                .saturating_add(loot.items.iter().map(|stack| stack.quantity).sum());
            debug!(entity = entity_id.0, gold = loot.gold, "loot_collected");
        }
    }
}

fn deliver_click(
    world: &mut GridWorld,
    player: Option<EntityId>,
    click: ClickSpec,
    cell_size: CellSize,
) -> bool {
    let Some(player) = player else {
        debug!(x_px = click.x_px, y_px = click.y_px, "click_without_player");
        return false;
    };
    let Some(cell) = screen_to_cell(click.x_px, click.y_px, cell_size) else {
        return false;
    };
    match apply_click(world, player, cell) {
        Ok(order) => {
            info!(x = cell.x, y = cell.y, ?order, "click_applied");
            true
        }
        Err(err) => {
            warn!(error = %err, x = cell.x, y = cell.y, "click_rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use mob_engine::{Capabilities, Entity, GridPos, MobProfile, StatusEffect};

    use super::*;

    fn homebody(name: &str, health: f32) -> Entity {
        Entity::new(name, health)
            .with_speed(2.0)
            .with_capabilities(Capabilities {
                can_wander: false,
                ..Capabilities::default()
            })
            .with_mob(MobProfile::default())
    }

    fn setup_with_player(health: f32, clicks: Vec<ClickSpec>) -> ScenarioWorld {
        let mut world = GridWorld::new("Forest", 10, 10, 3);
        let player = world.add_entity(homebody("player", health)).expect("player");
        ScenarioWorld {
            world,
            player: Some(player),
            clicks,
            cell_size: CellSize::default(),
        }
    }

    fn config(target_tps: u32, seconds: u64) -> LoopConfig {
        LoopConfig {
            target_tps,
            run_duration: Duration::from_secs(seconds),
            ..LoopConfig::default()
        }
    }

    #[test]
    fn runs_planned_ticks_and_respects_cap() {
        let mut setup = setup_with_player(10.0, Vec::new());
        let outcome = run_simulation(&config(4, 2), &mut setup).expect("run");
        assert_eq!(outcome.ticks, 8);
        assert_eq!(outcome.sim_seconds, 2.0);
        assert_eq!(outcome.survivors, 1);
        assert_eq!(outcome.player_alive, Some(true));

        let capped = LoopConfig {
            max_ticks: 3,
            ..config(4, 2)
        };
        let mut setup = setup_with_player(10.0, Vec::new());
        let outcome = run_simulation(&capped, &mut setup).expect("run");
        assert_eq!(outcome.ticks, 3);
    }

    #[test]
    fn scripted_click_walks_player_to_cell() {
        let click = ClickSpec {
            at_seconds: 0.0,
            x_px: 170.0,
            y_px: 10.0,
        };
        let mut setup = setup_with_player(10.0, vec![click]);
        let player = setup.player.expect("player");

        let outcome = run_simulation(&config(4, 2), &mut setup).expect("run");
        assert_eq!(outcome.clicks_applied, 1);
        let player = setup.world.entity(player).expect("player");
        assert_eq!(player.position(), GridPos::new(2, 0));
        assert_eq!(player.queued_path().count(), 0);
    }

    #[test]
    fn click_on_occupant_sends_player_to_fight() {
        let click = ClickSpec {
            at_seconds: 0.5,
            x_px: 250.0,
            y_px: 10.0,
        };
        let mut setup = setup_with_player(300.0, vec![click]);
        let player = setup.player.expect("player");
        let dummy = setup
            .world
            .add_entity(homebody("dummy", 500.0).with_position(GridPos::new(3, 0)))
            .expect("dummy");

        let outcome = run_simulation(&config(4, 1), &mut setup).expect("run");
        assert_eq!(outcome.clicks_applied, 1);
        let player = setup.world.entity(player).expect("player");
        assert_eq!(player.target(), Some(dummy));
    }

    #[test]
    fn player_death_ends_run_early() {
        let mut setup = setup_with_player(10.0, Vec::new());
        let player = setup.player.expect("player");
        setup
            .world
            .apply_status_effect(player, StatusEffect::burn(10.0, 10.0))
            .expect("burn");

        let outcome = run_simulation(&config(4, 60), &mut setup).expect("run");
        assert_eq!(outcome.ticks, 4);
        assert_eq!(outcome.deaths, 1);
        assert_eq!(outcome.player_alive, Some(false));
        assert_eq!(outcome.survivors, 0);
    }
}
