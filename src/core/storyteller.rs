/// Storyteller: the seam to the text-generation service.
///
/// Boards, end-of-game stories and random themes all come through the
/// `Storyteller` trait. Callers never retry: on any error they substitute
/// the canned text from this module.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::config::{GameConfig, KarmaTable};
use crate::core::grammar::{ExpansionContext, GrammarError, GrammarSet};
use crate::schema::board::{Board, Tile, TileKind};

const BUILTIN_GRAMMAR: &str = include_str!("../../story_data/grammar.ron");

pub const FALLBACK_THEMES: [&str; 5] = [
    "Jungle Safari Adventure",
    "Ghost Town Road Trip",
    "Space Station Mystery",
    "Medieval Castle Quest",
    "Underwater Treasure Hunt",
];

#[derive(Debug, Error)]
pub enum StorytellerError {
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarError),
    #[error("storyteller unavailable: {0}")]
    Unavailable(String),
    #[error("invalid board: {0}")]
    InvalidBoard(String),
}

/// Everything the storyteller knows about one player at the end of a game.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRequest {
    pub player_name: String,
    pub theme: String,
    pub karma: i32,
    pub actions: Vec<String>,
    pub position: usize,
    pub is_winner: bool,
}

pub trait Storyteller {
    fn generate_board(&mut self, theme: &str, player_count: usize) -> Result<Board, StorytellerError>;
    fn generate_player_story(&mut self, request: &StoryRequest) -> Result<String, StorytellerError>;
    fn generate_random_theme(&mut self) -> Result<String, StorytellerError>;
}

impl<T: Storyteller + ?Sized> Storyteller for Box<T> {
    fn generate_board(&mut self, theme: &str, player_count: usize) -> Result<Board, StorytellerError> {
        (**self).generate_board(theme, player_count)
    }

    fn generate_player_story(&mut self, request: &StoryRequest) -> Result<String, StorytellerError> {
        (**self).generate_player_story(request)
    }

    fn generate_random_theme(&mut self) -> Result<String, StorytellerError> {
        (**self).generate_random_theme()
    }
}

/// The canned story used when generation fails.
pub fn fallback_story(player_name: &str, theme: &str, karma: i32) -> String {
    format!(
        "{} embarked on an incredible journey through \"{}\". With {} karma points, they showed \
         their true character through every choice and challenge. Their adventure will be \
         remembered as a testament to their spirit and determination.",
        player_name, theme, karma
    )
}

pub fn fallback_theme<R: Rng + ?Sized>(rng: &mut R) -> String {
    FALLBACK_THEMES
        .choose(rng)
        .copied()
        .unwrap_or(FALLBACK_THEMES[0])
        .to_string()
}

const FALLBACK_PATTERN: [TileKind; 6] = [
    TileKind::Event,
    TileKind::Challenge,
    TileKind::Blessing,
    TileKind::Event,
    TileKind::Curse,
    TileKind::Rest,
];

/// A plain board with a fixed tile pattern, used when generation fails.
pub fn fallback_board(theme: &str, length: usize, karma: &KarmaTable) -> Board {
    let length = length.max(2);
    let tiles = (0..length)
        .map(|index| {
            let kind = if index == 0 {
                TileKind::Start
            } else {
                FALLBACK_PATTERN[(index - 1) % FALLBACK_PATTERN.len()]
            };
            let rule = karma.rule_for(kind);
            let (title, description) = match kind {
                TileKind::Start => ("Starting Line", "Every journey begins here."),
                TileKind::Event => ("Crossroads", "Something unexpected blocks the path."),
                TileKind::Challenge => ("Trial", "Only the brave pass this test."),
                TileKind::Blessing => ("Lucky Find", "Fortune smiles on the traveller."),
                TileKind::Curse => ("Bad Omen", "A shadow falls across the road."),
                TileKind::Rest => ("Campfire", "A quiet place to catch your breath."),
            };
            Tile {
                index,
                kind,
                title: title.to_string(),
                description: description.to_string(),
                karma_success: rule.success,
                karma_failure: rule.failure,
                choices: if kind.requires_resolution() {
                    vec!["Help".to_string(), "Walk away".to_string()]
                } else {
                    Vec::new()
                },
            }
        })
        .collect();
    Board {
        theme: theme.to_string(),
        tiles,
        story_context: format!("An adventure through \"{}\" awaits.", theme),
    }
}

/// Reject boards the game manager cannot play on.
pub fn validate_board(board: &Board) -> Result<(), StorytellerError> {
    if board.len() < 2 {
        return Err(StorytellerError::InvalidBoard(format!(
            "board needs at least 2 tiles, got {}",
            board.len()
        )));
    }
    if board.tiles[0].kind != TileKind::Start {
        return Err(StorytellerError::InvalidBoard(
            "first tile must be the start tile".to_string(),
        ));
    }
    Ok(())
}

/// Relative frequency of each kind on generated boards (after the start tile).
const KIND_WEIGHTS: [(TileKind, u32); 5] = [
    (TileKind::Event, 40),
    (TileKind::Challenge, 20),
    (TileKind::Blessing, 15),
    (TileKind::Curse, 15),
    (TileKind::Rest, 10),
];

/// Offline storyteller that expands a stochastic grammar.
pub struct GrammarStoryteller {
    grammars: GrammarSet,
    rng: StdRng,
    kinds: WeightedIndex<u32>,
    board_length: usize,
    karma: KarmaTable,
}

/// Builder for constructing a `GrammarStoryteller`.
pub struct GrammarStorytellerBuilder {
    grammar_path: Option<String>,
    grammars: Option<GrammarSet>,
    seed: Option<u64>,
    board_length: usize,
    karma: KarmaTable,
}

impl GrammarStoryteller {
    pub fn builder() -> GrammarStorytellerBuilder {
        GrammarStorytellerBuilder {
            grammar_path: None,
            grammars: None,
            seed: None,
            board_length: GameConfig::default().board_length,
            karma: KarmaTable::default(),
        }
    }

    /// Built-in grammar, board length, karma and seed taken from `config`.
    pub fn from_config(config: &GameConfig) -> Result<Self, StorytellerError> {
        let mut builder = Self::builder()
            .board_length(config.board_length)
            .karma(config.karma.clone());
        if let Some(seed) = config.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    fn roll_kind(&mut self) -> TileKind {
        KIND_WEIGHTS[self.kinds.sample(&mut self.rng)].0
    }

    fn make_tile(&mut self, index: usize, kind: TileKind, theme: &str) -> Result<Tile, StorytellerError> {
        let ctx = ExpansionContext::new()
            .tag(kind.tag())
            .bind("theme", theme)
            .bind("index", index.to_string());
        let title = self.grammars.expand("tile_title", &ctx, &mut self.rng)?;
        let description = self.grammars.expand("tile_description", &ctx, &mut self.rng)?;
        let choices = if matches!(kind, TileKind::Event | TileKind::Challenge) {
            vec![
                self.grammars.expand("choice_noble", &ctx, &mut self.rng)?,
                self.grammars.expand("choice_selfish", &ctx, &mut self.rng)?,
            ]
        } else {
            Vec::new()
        };
        let rule = self.karma.rule_for(kind);
        Ok(Tile {
            index,
            kind,
            title,
            description,
            karma_success: rule.success,
            karma_failure: rule.failure,
            choices,
        })
    }
}

impl Storyteller for GrammarStoryteller {
    fn generate_board(&mut self, theme: &str, player_count: usize) -> Result<Board, StorytellerError> {
        debug!(theme, player_count, length = self.board_length, "generating board");
        let mut tiles = Vec::with_capacity(self.board_length);
        tiles.push(self.make_tile(0, TileKind::Start, theme)?);
        for index in 1..self.board_length {
            let kind = self.roll_kind();
            tiles.push(self.make_tile(index, kind, theme)?);
        }

        let ctx = ExpansionContext::new()
            .bind("theme", theme)
            .bind("players", player_count.to_string());
        let story_context = self.grammars.expand("story_context", &ctx, &mut self.rng)?;

        let board = Board {
            theme: theme.to_string(),
            tiles,
            story_context,
        };
        validate_board(&board)?;
        Ok(board)
    }

    fn generate_player_story(&mut self, request: &StoryRequest) -> Result<String, StorytellerError> {
        let karma_tag = match request.karma {
            k if k < 0 => "karma:negative",
            k if k >= 30 => "karma:high",
            _ => "karma:modest",
        };
        let moment = request
            .actions
            .iter()
            .rev()
            .find(|a| a.starts_with("Chose"))
            .or_else(|| request.actions.last())
            .cloned()
            .unwrap_or_else(|| "a quiet walk".to_string());

        let mut ctx = ExpansionContext::new()
            .tag(karma_tag)
            .bind("name", request.player_name.as_str())
            .bind("theme", request.theme.as_str())
            .bind("karma", request.karma.to_string())
            .bind("position", request.position.to_string())
            .bind("moment", moment)
            .bind("deeds", request.actions.len().to_string());
        if request.is_winner {
            ctx = ctx.tag("winner");
        }
        Ok(self.grammars.expand("player_story", &ctx, &mut self.rng)?)
    }

    fn generate_random_theme(&mut self) -> Result<String, StorytellerError> {
        Ok(self
            .grammars
            .expand("random_theme", &ExpansionContext::new(), &mut self.rng)?)
    }
}

impl GrammarStorytellerBuilder {
    /// Grammar file merged over the built-in grammar.
    pub fn grammar_file(mut self, path: &str) -> Self {
        self.grammar_path = Some(path.to_string());
        self
    }

    /// Provide grammars directly, replacing the built-in grammar.
    pub fn with_grammars(mut self, grammars: GrammarSet) -> Self {
        self.grammars = Some(grammars);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn board_length(mut self, length: usize) -> Self {
        self.board_length = length;
        self
    }

    pub fn karma(mut self, karma: KarmaTable) -> Self {
        self.karma = karma;
        self
    }

    pub fn build(self) -> Result<GrammarStoryteller, StorytellerError> {
        let mut grammars = match self.grammars {
            Some(grammars) => grammars,
            None => GrammarSet::parse_ron(BUILTIN_GRAMMAR)?,
        };
        if let Some(ref path) = self.grammar_path {
            grammars.merge(GrammarSet::load_from_ron(Path::new(path))?);
        }
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let kinds = WeightedIndex::new(KIND_WEIGHTS.iter().map(|(_, weight)| *weight))
            .map_err(|e| StorytellerError::InvalidBoard(format!("tile kind weights: {e}")))?;
        Ok(GrammarStoryteller {
            grammars,
            rng,
            kinds,
            board_length: self.board_length.max(2),
            karma: self.karma,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> GrammarStoryteller {
        GrammarStoryteller::builder()
            .seed(seed)
            .board_length(16)
            .build()
            .unwrap()
    }

    fn request(karma: i32, is_winner: bool) -> StoryRequest {
        StoryRequest {
            player_name: "Ada".to_string(),
            theme: "Space Station Mystery".to_string(),
            karma,
            actions: vec![
                "Rolled 7".to_string(),
                "Chose: Share the oxygen".to_string(),
            ],
            position: 5,
            is_winner,
        }
    }

    #[test]
    fn builtin_grammar_has_no_dangling_refs() {
        let gs = GrammarSet::parse_ron(BUILTIN_GRAMMAR).unwrap();
        assert!(gs.dangling_references().is_empty(), "{:?}", gs.dangling_references());
    }

    #[test]
    fn generated_board_shape() {
        let mut teller = seeded(42);
        let board = teller.generate_board("Space Station Mystery", 4).unwrap();
        assert_eq!(board.len(), 16);
        assert_eq!(board.tiles[0].kind, TileKind::Start);
        assert!(!board.story_context.is_empty());
        for (i, tile) in board.tiles.iter().enumerate() {
            assert_eq!(tile.index, i);
            assert!(!tile.title.is_empty());
            assert!(!tile.description.is_empty());
            let rule = KarmaTable::default().rule_for(tile.kind);
            assert_eq!(tile.karma_success, rule.success);
            assert_eq!(tile.karma_failure, rule.failure);
        }
    }

    #[test]
    fn tile_kinds_follow_weights() {
        let mut teller = seeded(13);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..2000 {
            *counts.entry(teller.roll_kind()).or_insert(0usize) += 1;
        }
        assert!(!counts.contains_key(&TileKind::Start));
        for (kind, _) in KIND_WEIGHTS {
            assert!(counts.get(&kind).copied().unwrap_or(0) > 0, "{:?} never rolled", kind);
        }
        assert!(counts[&TileKind::Event] > counts[&TileKind::Rest]);
    }

    #[test]
    fn same_seed_same_board() {
        let a = seeded(9).generate_board("Ghost Town Road Trip", 2).unwrap();
        let b = seeded(9).generate_board("Ghost Town Road Trip", 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn story_mentions_player_and_theme() {
        let mut teller = seeded(1);
        for karma in [-10, 5, 40] {
            for winner in [true, false] {
                let story = teller.generate_player_story(&request(karma, winner)).unwrap();
                assert!(story.contains("Ada"), "{}", story);
                assert!(story.contains("Space Station Mystery"), "{}", story);
            }
        }
    }

    #[test]
    fn random_theme_not_empty() {
        let mut teller = seeded(5);
        assert!(!teller.generate_random_theme().unwrap().is_empty());
    }

    #[test]
    fn fallback_story_text() {
        let story = fallback_story("Bo", "Jungle Safari Adventure", 12);
        assert!(story.starts_with("Bo embarked on an incredible journey through \"Jungle Safari Adventure\"."));
        assert!(story.contains("With 12 karma points"));
    }

    #[test]
    fn fallback_board_is_valid() {
        let board = fallback_board("Medieval Castle Quest", 10, &KarmaTable::default());
        assert!(validate_board(&board).is_ok());
        assert_eq!(board.len(), 10);
        assert_eq!(board.tiles[6].kind, TileKind::Rest);
    }

    #[test]
    fn validate_rejects_short_board() {
        let mut board = fallback_board("x", 2, &KarmaTable::default());
        board.tiles.truncate(1);
        assert!(matches!(validate_board(&board), Err(StorytellerError::InvalidBoard(_))));
    }
}
