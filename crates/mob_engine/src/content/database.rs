use std::collections::HashMap;

use crate::sim::{Capabilities, DropTable, Entity, MobProfile};
use crate::world::GridPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MobDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatStats {
    pub strength: f32,
    pub damage: f32,
    pub attack_speed: f32,
    pub attack_range: u32,
    pub aggro_range: u32,
}

impl Default for CombatStats {
    fn default() -> Self {
        let profile = MobProfile::default();
        Self {
            strength: profile.strength,
            damage: profile.damage,
            attack_speed: profile.attack_speed,
            attack_range: profile.attack_range,
            aggro_range: profile.aggro_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MobTemplate {
    pub id: MobDefId,
    pub def_name: String,
    pub label: String,
    pub level: u32,
    pub max_health: f32,
    pub defence: f32,
    pub speed: f32,
    pub health_regeneration: f32,
    pub wandering_factor: f32,
    pub combat: Option<CombatStats>,
    pub capabilities: Capabilities,
    pub drops: DropTable,
}

impl MobTemplate {
    /// Fresh, full-health entity at `position`, not yet inserted into any world.
    pub fn spawn(&self, position: GridPos) -> Entity {
        let mut entity = Entity::new(self.label.clone(), self.max_health)
            .with_position(position)
            .with_level(self.level)
            .with_defence(self.defence)
            .with_speed(self.speed)
            .with_regeneration(self.health_regeneration)
            .with_wandering_factor(self.wandering_factor)
            .with_capabilities(self.capabilities)
            .with_drops(self.drops.clone());
        entity.bestiary_id = self.def_name.clone();
        if let Some(combat) = self.combat {
            entity = entity.with_mob(MobProfile {
                strength: combat.strength,
                damage: combat.damage,
                attack_speed: combat.attack_speed,
                attack_range: combat.attack_range,
                aggro_range: combat.aggro_range,
                ..MobProfile::default()
            });
        }
        entity
    }
}

#[derive(Debug, Default, Clone)]
pub struct Bestiary {
    templates: Vec<MobTemplate>,
    ids_by_name: HashMap<String, MobDefId>,
}

impl Bestiary {
    pub(crate) fn from_templates(mut templates: Vec<MobTemplate>) -> Self {
        let mut ids_by_name = HashMap::with_capacity(templates.len());
        for (idx, template) in templates.iter_mut().enumerate() {
            let id = MobDefId(idx as u32);
            template.id = id;
            ids_by_name.insert(template.def_name.clone(), id);
        }
        Self {
            templates,
            ids_by_name,
        }
    }

    pub fn id_by_name(&self, def_name: &str) -> Option<MobDefId> {
        self.ids_by_name.get(def_name).copied()
    }

    pub fn template(&self, id: MobDefId) -> Option<&MobTemplate> {
        self.templates.get(id.0 as usize)
    }

    pub fn template_by_name(&self, def_name: &str) -> Option<&MobTemplate> {
        self.id_by_name(def_name).and_then(|id| self.template(id))
    }

    pub fn templates(&self) -> &[MobTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
