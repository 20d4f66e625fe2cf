/// Game configuration: board size, seat limits and karma deltas, loaded from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::board::TileKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Karma awarded for resolving a tile, per outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaRule {
    pub success: i32,
    pub failure: i32,
}

/// Fixed per-kind karma deltas used when generating boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarmaTable {
    pub event: KarmaRule,
    pub challenge: KarmaRule,
    pub blessing: KarmaRule,
    pub curse: KarmaRule,
}

impl Default for KarmaTable {
    fn default() -> Self {
        Self {
            event: KarmaRule {
                success: 10,
                failure: -5,
            },
            challenge: KarmaRule {
                success: 15,
                failure: -10,
            },
            blessing: KarmaRule {
                success: 5,
                failure: 5,
            },
            curse: KarmaRule {
                success: -5,
                failure: -5,
            },
        }
    }
}

impl KarmaTable {
    /// Start and Rest tiles never change karma.
    pub fn rule_for(&self, kind: TileKind) -> KarmaRule {
        match kind {
            TileKind::Event => self.event,
            TileKind::Challenge => self.challenge,
            TileKind::Blessing => self.blessing,
            TileKind::Curse => self.curse,
            TileKind::Start | TileKind::Rest => KarmaRule {
                success: 0,
                failure: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub board_length: usize,
    pub max_players: usize,
    pub min_players: usize,
    /// Finish automatically once this many full rounds have been played.
    pub max_rounds: Option<u32>,
    /// Fixed RNG seed for dice and generation. `None` seeds from entropy.
    pub seed: Option<u64>,
    pub karma: KarmaTable,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_length: 24,
            max_players: 4,
            min_players: 1,
            max_rounds: None,
            seed: None,
            karma: KarmaTable::default(),
        }
    }
}

impl GameConfig {
    /// Load a config from a RON file. Missing fields take their defaults.
    pub fn load_from_ron(path: &Path) -> Result<GameConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<GameConfig, ConfigError> {
        let config: GameConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board_length < 2 {
            return Err(ConfigError::Invalid(format!(
                "board_length must be at least 2, got {}",
                self.board_length
            )));
        }
        if self.min_players == 0 || self.min_players > self.max_players {
            return Err(ConfigError::Invalid(format!(
                "player limits must satisfy 1 <= min ({}) <= max ({})",
                self.min_players, self.max_players
            )));
        }
        if self.max_rounds == Some(0) {
            return Err(ConfigError::Invalid(
                "max_rounds must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
