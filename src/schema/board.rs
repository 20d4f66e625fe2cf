use serde::{Deserialize, Serialize};

/// What happens when a player lands on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Start,
    Event,
    Challenge,
    Blessing,
    Curse,
    Rest,
}

impl TileKind {
    /// Returns the tag string for this kind (e.g., "tile:challenge").
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Start => "tile:start",
            Self::Event => "tile:event",
            Self::Challenge => "tile:challenge",
            Self::Blessing => "tile:blessing",
            Self::Curse => "tile:curse",
            Self::Rest => "tile:rest",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Event => "event",
            Self::Challenge => "challenge",
            Self::Blessing => "blessing",
            Self::Curse => "curse",
            Self::Rest => "rest",
        }
    }

    /// Kinds that interrupt the turn with an event to resolve.
    pub fn requires_resolution(&self) -> bool {
        !matches!(self, Self::Start | Self::Rest)
    }
}

/// A single square of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub index: usize,
    pub kind: TileKind,
    pub title: String,
    pub description: String,
    /// Karma applied when the event is resolved successfully.
    pub karma_success: i32,
    /// Karma applied when the event is failed.
    pub karma_failure: i32,
    pub choices: Vec<String>,
}

impl Tile {
    pub fn requires_resolution(&self) -> bool {
        self.kind.requires_resolution()
    }

    pub fn karma_delta(&self, success: bool) -> i32 {
        if success {
            self.karma_success
        } else {
            self.karma_failure
        }
    }
}

/// A fixed-length loop of tiles generated once per game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub theme: String,
    pub tiles: Vec<Tile>,
    pub story_context: String,
}

impl Board {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// The tile at `position`, wrapping around the loop.
    pub fn tile(&self, position: usize) -> Option<&Tile> {
        if self.tiles.is_empty() {
            return None;
        }
        self.tiles.get(position % self.tiles.len())
    }

    /// Position reached after walking `steps` tiles from `from`.
    pub fn advance(&self, from: usize, steps: usize) -> usize {
        if self.tiles.is_empty() {
            return 0;
        }
        (from + steps) % self.tiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_board(len: usize) -> Board {
        let tiles = (0..len)
            .map(|i| Tile {
                index: i,
                kind: if i == 0 { TileKind::Start } else { TileKind::Event },
                title: format!("Tile {}", i),
                description: String::new(),
                karma_success: 10,
                karma_failure: -5,
                choices: Vec::new(),
            })
            .collect();
        Board {
            theme: "Test".to_string(),
            tiles,
            story_context: String::new(),
        }
    }

    #[test]
    fn advance_wraps_around() {
        let board = make_board(10);
        assert_eq!(board.advance(0, 7), 7);
        assert_eq!(board.advance(7, 5), 2);
        assert_eq!(board.advance(9, 1), 0);
        assert_eq!(board.advance(3, 20), 3);
    }

    #[test]
    fn tile_lookup_wraps() {
        let board = make_board(4);
        assert_eq!(board.tile(5).map(|t| t.index), Some(1));
    }

    #[test]
    fn empty_board_is_safe() {
        let board = make_board(0);
        assert!(board.tile(3).is_none());
        assert_eq!(board.advance(3, 4), 0);
    }

    #[test]
    fn start_and_rest_need_no_resolution() {
        assert!(!TileKind::Start.requires_resolution());
        assert!(!TileKind::Rest.requires_resolution());
        assert!(TileKind::Event.requires_resolution());
        assert!(TileKind::Curse.requires_resolution());
    }

    #[test]
    fn karma_delta_by_outcome() {
        let board = make_board(2);
        let tile = &board.tiles[1];
        assert_eq!(tile.karma_delta(true), 10);
        assert_eq!(tile.karma_delta(false), -5);
    }
}
