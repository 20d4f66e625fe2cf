use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::board::Board;
use super::player::{Player, PlayerId};

/// Newtype wrapper for game IDs (the short room code).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Waiting,
    Playing,
    Finished,
}

impl GamePhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Finished => "finished",
        }
    }
}

/// The outcome of throwing two six-sided dice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub dice: [u8; 2],
}

impl DiceRoll {
    pub fn total(&self) -> u8 {
        self.dice[0] + self.dice[1]
    }
}

/// An event tile waiting for the current player to resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    pub player_id: PlayerId,
    pub tile_index: usize,
}

/// Everything needed to resume a game, serialized wholesale on each mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub id: GameId,
    pub theme: String,
    pub players: BTreeMap<PlayerId, Player>,
    /// Seating order; `current_turn` indexes into it.
    pub turn_order: Vec<PlayerId>,
    pub current_turn: usize,
    pub round: u32,
    pub board: Board,
    pub phase: GamePhase,
    pub last_roll: Option<DiceRoll>,
    pub pending_event: Option<PendingEvent>,
    pub created_at: DateTime<Utc>,
}

impl GameState {
    pub fn player_count(&self) -> usize {
        self.turn_order.len()
    }

    pub fn current_player_id(&self) -> Option<&PlayerId> {
        self.turn_order.get(self.current_turn)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.current_player_id().and_then(|id| self.players.get(id))
    }

    /// Players ordered by karma, highest first. Ties keep seating order.
    pub fn standings(&self) -> Vec<&Player> {
        let mut ranked: Vec<&Player> = self
            .turn_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .collect();
        ranked.sort_by(|a, b| b.karma.cmp(&a.karma));
        ranked
    }

    pub fn winner(&self) -> Option<&Player> {
        self.standings().into_iter().next()
    }

    pub fn is_players_turn(&self, player_id: &PlayerId) -> bool {
        self.current_player_id() == Some(player_id)
    }
}

/// Whether a chat line was typed by a player or generated by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub player_id: Option<PlayerId>,
    pub player_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state(karmas: &[(&str, i32)]) -> GameState {
        let mut players = BTreeMap::new();
        let mut turn_order = Vec::new();
        for (name, karma) in karmas {
            let id = PlayerId::from(*name);
            let mut p = Player::new_guest(id.clone(), name, "🦊", "bg-red-500");
            p.karma = *karma;
            players.insert(id.clone(), p);
            turn_order.push(id);
        }
        GameState {
            id: GameId("ABC123".to_string()),
            theme: "Space Station Mystery".to_string(),
            players,
            turn_order,
            current_turn: 0,
            round: 1,
            board: Board {
                theme: "Space Station Mystery".to_string(),
                tiles: Vec::new(),
                story_context: String::new(),
            },
            phase: GamePhase::Playing,
            last_roll: None,
            pending_event: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn standings_sorted_by_karma() {
        let state = make_state(&[("zed", 5), ("amy", 20), ("bob", -3)]);
        let names: Vec<&str> = state.standings().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["amy", "zed", "bob"]);
        assert_eq!(state.winner().map(|p| p.name.as_str()), Some("amy"));
    }

    #[test]
    fn standings_ties_keep_seating_order() {
        let state = make_state(&[("zed", 7), ("amy", 7)]);
        assert_eq!(state.winner().map(|p| p.name.as_str()), Some("zed"));
    }

    #[test]
    fn current_player_follows_turn_index() {
        let mut state = make_state(&[("zed", 0), ("amy", 0)]);
        assert_eq!(state.current_player().map(|p| p.name.as_str()), Some("zed"));
        state.current_turn = 1;
        assert!(state.is_players_turn(&PlayerId::from("amy")));
    }

    #[test]
    fn dice_total() {
        assert_eq!(DiceRoll { dice: [6, 5] }.total(), 11);
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&GamePhase::Playing).unwrap(), "\"playing\"");
    }
}
