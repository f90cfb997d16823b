use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inclusive integer range; `min > max` is treated as the single value `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRange {
    pub min: u32,
    pub max: u32,
}

impl RollRange {
    pub const fn fixed(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn roll<R: Rng + ?Sized>(self, rng: &mut R) -> u32 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDrop {
    pub item_id: String,
    /// Percent chance in `[0, 100]`.
    pub chance: f32,
    #[serde(default)]
    pub quantity: Option<RollRange>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTable {
    #[serde(default)]
    pub gold: Option<RollRange>,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub items: Vec<ItemDrop>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loot {
    pub gold: u32,
    pub experience: u32,
    pub items: Vec<ItemStack>,
}

impl Loot {
    pub fn is_empty(&self) -> bool {
        self.gold == 0 && self.experience == 0 && self.items.is_empty()
    }
}

impl DropTable {
    pub fn is_empty(&self) -> bool {
        self.gold.is_none() && self.experience == 0 && self.items.is_empty()
    }

    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Loot {
        let gold = self.gold.map(|range| range.roll(rng)).unwrap_or(0);
        let mut items = Vec::new();
        for drop in &self.items {
            let roll = rng.gen::<f32>() * 100.0;
            if roll < drop.chance {
                let quantity = drop.quantity.map(|range| range.roll(rng)).unwrap_or(1);
                items.push(ItemStack {
                    item_id: drop.item_id.clone(),
                    quantity,
                });
            }
        }
        Loot {
            gold,
            experience: self.experience,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn empty_table_rolls_empty_loot() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let loot = DropTable::default().roll(&mut rng);
        assert!(loot.is_empty());
    }

    #[test]
    fn guaranteed_and_impossible_drops() {
        let table = DropTable {
            gold: Some(RollRange { min: 5, max: 10 }),
            experience: 12,
            items: vec![
                ItemDrop {
                    item_id: "bone".to_string(),
                    chance: 100.0,
                    quantity: Some(RollRange::fixed(3)),
                },
                ItemDrop {
                    item_id: "crown".to_string(),
                    chance: 0.0,
                    quantity: None,
                },
            ],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            let loot = table.roll(&mut rng);
            assert!((5..=10).contains(&loot.gold));
            assert_eq!(loot.experience, 12);
            assert_eq!(
                loot.items,
                vec![ItemStack {
                    item_id: "bone".to_string(),
                    quantity: 3
                }]
            );
        }
    }

    #[test]
    fn same_seed_rolls_same_loot() {
        let table = DropTable {
            gold: Some(RollRange { min: 0, max: 1000 }),
            experience: 0,
            items: vec![ItemDrop {
                item_id: "herb".to_string(),
                chance: 50.0,
                quantity: Some(RollRange { min: 1, max: 4 }),
            }],
        };
        let first = table.roll(&mut ChaCha8Rng::seed_from_u64(7));
        let second = table.roll(&mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(first, second);
    }
}
