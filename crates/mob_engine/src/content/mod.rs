mod bestiary;
mod database;

pub use bestiary::{
    load_bestiary, parse_bestiary_str, BestiaryError, BestiaryErrorCode, SourceLocation,
};
pub use database::{Bestiary, CombatStats, MobDefId, MobTemplate};
