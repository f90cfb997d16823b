use serde::{Deserialize, Serialize};

use crate::error::SimError;

pub const BURN_EFFECT_ID: &str = "burn";
pub const SLOW_EFFECT_ID: &str = "slow";
const BURN_TICK_SECONDS: f32 = 1.0;
const BURN_DAMAGE_PER_STRENGTH: f32 = 2.0;
const SLOW_SPEED_MULTIPLIER: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEffectKind {
    Burn,
    Slow,
}

impl StatusEffectKind {
    pub fn default_id(self) -> &'static str {
        match self {
            Self::Burn => BURN_EFFECT_ID,
            Self::Slow => SLOW_EFFECT_ID,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Burn => "Burn",
            Self::Slow => "Slow",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusEffect {
    pub id: String,
    pub name: String,
    pub kind: StatusEffectKind,
    pub duration: f32,
    pub strength: f32,
    tick_timer: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusPulse {
    pub kind: StatusEffectKind,
    pub damage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusApplyOutcome {
    Added,
    Refreshed,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatusTick {
    pub pulses: Vec<StatusPulse>,
    pub expired: Vec<String>,
}

impl StatusEffect {
    pub fn new(kind: StatusEffectKind, duration: f32, strength: f32) -> Self {
        Self {
            id: kind.default_id().to_string(),
            name: kind.display_name().to_string(),
            kind,
            duration,
            strength,
            tick_timer: 0.0,
        }
    }

    pub fn burn(duration: f32, strength: f32) -> Self {
        Self::new(StatusEffectKind::Burn, duration, strength)
    }

    pub fn slow(duration: f32, strength: f32) -> Self {
        Self::new(StatusEffectKind::Slow, duration, strength)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.id.trim().is_empty() {
            return Err(SimError::InvalidEffect {
                reason: "effect id must be non-empty".to_string(),
            });
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(SimError::InvalidEffect {
                reason: format!(
                    "effect `{}` duration must be finite and > 0, got {}",
                    self.id, self.duration
                ),
            });
        }
        if !self.strength.is_finite() || self.strength < 0.0 {
            return Err(SimError::InvalidEffect {
                reason: format!(
                    "effect `{}` strength must be finite and >= 0, got {}",
                    self.id, self.strength
                ),
            });
        }
        Ok(())
    }

    pub fn is_expired(&self) -> bool {
        self.duration <= 0.0
    }

    pub fn tick_timer(&self) -> f32 {
        self.tick_timer
    }

    fn speed_multiplier(&self) -> f32 {
        match self.kind {
            StatusEffectKind::Slow => SLOW_SPEED_MULTIPLIER,
            StatusEffectKind::Burn => 1.0,
        }
    }

    fn update(&mut self, dt: f32, pulses: &mut Vec<StatusPulse>) {
        self.duration -= dt;
        if self.is_expired() {
            return;
        }
        if self.kind == StatusEffectKind::Burn {
            self.tick_timer += dt;
            while self.tick_timer >= BURN_TICK_SECONDS {
                pulses.push(StatusPulse {
                    kind: self.kind,
                    damage: self.strength * BURN_DAMAGE_PER_STRENGTH,
                });
                self.tick_timer -= BURN_TICK_SECONDS;
            }
        }
    }
}

/// At most one effect per id. Reapplying replaces the duration and adds the strength.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatusEffectManager {
    effects: Vec<StatusEffect>,
}

impl StatusEffectManager {
    pub fn apply(&mut self, effect: StatusEffect) -> Result<StatusApplyOutcome, SimError> {
        effect.validate()?;
        if let Some(existing) = self.effects.iter_mut().find(|e| e.id == effect.id) {
            existing.duration = effect.duration;
            existing.strength += effect.strength;
            return Ok(StatusApplyOutcome::Refreshed);
        }
        self.effects.push(effect);
        Ok(StatusApplyOutcome::Added)
    }

    pub fn remove(&mut self, effect_id: &str) -> Option<StatusEffect> {
        let slot = self.effects.iter().position(|e| e.id == effect_id)?;
        Some(self.effects.remove(slot))
    }

    pub fn update(&mut self, dt: f32) -> StatusTick {
        let mut tick = StatusTick::default();
        for effect in &mut self.effects {
            effect.update(dt, &mut tick.pulses);
        }
        self.effects.retain(|effect| {
            if effect.is_expired() {
                tick.expired.push(effect.id.clone());
                false
            } else {
                true
            }
        });
        tick
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    pub fn get(&self, effect_id: &str) -> Option<&StatusEffect> {
        self.effects.iter().find(|e| e.id == effect_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusEffect> {
        self.effects.iter()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.effects
            .iter()
            .map(StatusEffect::speed_multiplier)
            .product()
    }
}
