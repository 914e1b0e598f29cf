//! Game simulation modules

pub mod combat;
pub mod commands;
pub mod factory;
pub mod flag;
pub mod physics;
pub mod player;
pub mod session;
pub mod world;

pub use factory::{GameFactory, StandardGameFactory};
pub use player::Controller;
pub use session::{GameRegistry, GameRules, GameSession};
pub use world::MapInfo;

use uuid::Uuid;

pub type GameId = Uuid;

/// Humans count up from 1, robots down from -1
pub type PlayerId = i32;

/// Unique within one game
pub type FlagId = i32;
