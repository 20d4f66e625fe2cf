/// Local session: the per-device glue around a `GameManager`.
///
/// Owns the ids of the game and of the player holding the device, writes
/// the session record that lets a reload resume the game, and asks the
/// storyteller for boards and stories (falling back to canned text).

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::GameConfig;
use crate::core::manager::{GameError, GameManager, ListenerId};
use crate::core::palette;
use crate::core::store::{
    self, KeyValueStore, StoreError, CHAT_KEY, FINAL_GAME_KEY, GAME_STATE_KEY, SESSION_KEY,
};
use crate::core::storyteller::{fallback_board, fallback_story, fallback_theme, StoryRequest, Storyteller};
use crate::schema::board::Tile;
use crate::schema::game::{ChatMessage, GameId, GamePhase, GameState};
use crate::schema::player::{Player, PlayerId};

/// Boards are always generated for a full table.
pub const BOARD_PLAYER_COUNT: usize = 4;
pub const GAME_MODE_LOCAL: &str = "local";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session has no game manager")]
    NotInitialized,
    #[error("no local game data found")]
    NoSavedGame,
    #[error("invalid game data: {0}")]
    InvalidRecord(String),
    #[error("player name is required")]
    EmptyName,
    #[error("theme is required")]
    EmptyTheme,
    #[error("no game state available")]
    NoGameState,
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What the device remembers about the game it is hosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub game_id: String,
    pub player_id: String,
    pub player_name: String,
    pub theme: String,
    pub is_host: bool,
    pub game_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_phase: Option<GamePhase>,
}

/// One entry of the end-of-game story screen, in final ranking order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStory {
    pub player_id: PlayerId,
    pub player_name: String,
    pub rank: usize,
    pub karma: i32,
    pub is_winner: bool,
    pub story: String,
    pub used_fallback: bool,
}

type SharedStateListeners = Rc<RefCell<Vec<(ListenerId, Box<dyn FnMut(&GameState)>)>>>;
type SharedChatListeners = Rc<RefCell<Vec<(ListenerId, Box<dyn FnMut(&[ChatMessage])>)>>>;

/// Subscriptions belong to the session, not to a manager: every manager the
/// session creates forwards its notifications to them.
pub struct LocalSession<S: KeyValueStore + ?Sized, T: Storyteller> {
    store: Rc<S>,
    storyteller: T,
    config: GameConfig,
    manager: Option<GameManager<S>>,
    player_id: Option<PlayerId>,
    rng: StdRng,
    last_error: Option<String>,
    state_listeners: SharedStateListeners,
    chat_listeners: SharedChatListeners,
    next_listener: ListenerId,
}

impl<S: KeyValueStore + ?Sized, T: Storyteller> LocalSession<S, T> {
    pub fn new(store: Rc<S>, storyteller: T, config: GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            storyteller,
            config,
            manager: None,
            player_id: None,
            rng,
            last_error: None,
            state_listeners: Rc::new(RefCell::new(Vec::new())),
            chat_listeners: Rc::new(RefCell::new(Vec::new())),
            next_listener: 1,
        }
    }

    pub fn manager(&self) -> Option<&GameManager<S>> {
        self.manager.as_ref()
    }

    pub fn manager_mut(&mut self) -> Option<&mut GameManager<S>> {
        self.manager.as_mut()
    }

    pub fn game_state(&self) -> Option<&GameState> {
        self.manager.as_ref().and_then(|m| m.game_state())
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        self.player_id.as_ref()
    }

    /// The player holding the device, once the game knows about them.
    pub fn current_player(&self) -> Option<&Player> {
        let id = self.player_id.as_ref()?;
        self.game_state()?.players.get(id)
    }

    /// Message of the most recent failed operation, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bind the session to a game and player, generating ids that are not given.
    ///
    /// An existing manager is kept when the ids match and replaced otherwise.
    pub fn initialize(&mut self, game_id: Option<GameId>, player_id: Option<PlayerId>) -> (GameId, PlayerId) {
        if let (Some(manager), Some(current_player)) = (&self.manager, &self.player_id) {
            let same_game = game_id.as_ref().map_or(true, |id| id == manager.game_id());
            let same_player = player_id.as_ref().map_or(true, |id| id == current_player);
            if same_game && same_player {
                debug!("game manager already initialized with same ids");
                return (manager.game_id().clone(), current_player.clone());
            }
        }

        if let Some(mut old) = self.manager.take() {
            debug!(game_id = %old.game_id(), "replacing game manager");
            old.cleanup();
        }

        let game_id = game_id.unwrap_or_else(|| palette::generate_game_id(&mut self.rng));
        let player_id = player_id.unwrap_or_else(|| palette::generate_player_id(&mut self.rng));
        info!(game_id = %game_id, player_id = %player_id, "initializing local game");

        let mut manager = GameManager::new(game_id.clone(), self.store.clone(), self.config.clone());
        self.forward_notifications(&mut manager);
        self.manager = Some(manager);
        self.player_id = Some(player_id.clone());
        (game_id, player_id)
    }

    /// Host a new game: generate the board, seat the host, remember the session.
    pub fn create_game(&mut self, player_name: &str, theme: &str) -> Result<GameId, SessionError> {
        let result = self.create_game_inner(player_name.trim(), theme.trim());
        self.track(result)
    }

    fn create_game_inner(&mut self, player_name: &str, theme: &str) -> Result<GameId, SessionError> {
        if player_name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        if theme.is_empty() {
            return Err(SessionError::EmptyTheme);
        }
        if self.manager.is_none() {
            self.initialize(None, None);
        }
        let player_id = self.player_id.clone().ok_or(SessionError::NotInitialized)?;

        let board = match self.storyteller.generate_board(theme, BOARD_PLAYER_COUNT) {
            Ok(board) => board,
            Err(e) => {
                warn!(error = %e, "board generation failed, using fallback board");
                fallback_board(theme, self.config.board_length, &self.config.karma)
            }
        };
        debug!(tiles = board.len(), "board ready");

        let host = Player::new_host(
            player_id.clone(),
            player_name,
            palette::random_avatar(&mut self.rng),
            palette::random_color(&mut self.rng),
        );
        let manager = self.manager.as_mut().ok_or(SessionError::NotInitialized)?;
        let game_id = manager.create_game(host, theme, board)?;

        let record = SessionRecord {
            game_id: game_id.0.clone(),
            player_id: player_id.0,
            player_name: player_name.to_string(),
            theme: theme.to_string(),
            is_host: true,
            game_mode: GAME_MODE_LOCAL.to_string(),
            game_phase: None,
        };
        store::save_json(&*self.store, SESSION_KEY, &record)?;
        info!(game_id = %game_id, "local game created");
        Ok(game_id)
    }

    /// Resume the game remembered by this device.
    pub fn load_game(&mut self) -> Result<(), SessionError> {
        let result = self.load_game_inner();
        self.track(result)
    }

    fn load_game_inner(&mut self) -> Result<(), SessionError> {
        let record: SessionRecord =
            store::load_json(&*self.store, SESSION_KEY)?.ok_or(SessionError::NoSavedGame)?;
        if record.game_id.is_empty() {
            return Err(SessionError::InvalidRecord("missing game ID".to_string()));
        }
        let player_id = (!record.player_id.is_empty()).then(|| PlayerId(record.player_id.clone()));
        let (game_id, _) = self.initialize(Some(GameId(record.game_id.clone())), player_id);
        let manager = self.manager.as_mut().ok_or(SessionError::NotInitialized)?;

        match store::load_json::<GameState, _>(&*self.store, GAME_STATE_KEY) {
            Ok(Some(state)) => {
                manager.load_game_state(state);
                info!(game_id = %game_id, "loaded game state from store");
            }
            Ok(None) => debug!("no saved game state"),
            Err(e) => error!(error = %e, "failed to load saved game state"),
        }
        if let Err(e) = manager.restore_chat() {
            error!(error = %e, "failed to restore chat history");
        }
        Ok(())
    }

    /// Seat another player on this device with the first free color and avatar.
    pub fn add_player(&mut self, player_name: &str) -> Result<PlayerId, SessionError> {
        let result = self.add_player_inner(player_name.trim());
        self.track(result)
    }

    fn add_player_inner(&mut self, player_name: &str) -> Result<PlayerId, SessionError> {
        if player_name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        let manager = self.manager.as_mut().ok_or(SessionError::NotInitialized)?;
        let (used_colors, used_avatars): (Vec<String>, Vec<String>) = manager
            .game_state()
            .map(|state| {
                state
                    .players
                    .values()
                    .map(|p| (p.color.clone(), p.avatar.clone()))
                    .unzip()
            })
            .unwrap_or_default();
        let used_colors: Vec<&str> = used_colors.iter().map(String::as_str).collect();
        let used_avatars: Vec<&str> = used_avatars.iter().map(String::as_str).collect();

        let color = palette::first_unused(&palette::PLAYER_COLORS, &used_colors, &mut self.rng);
        let avatar = palette::first_unused(&palette::PLAYER_AVATARS, &used_avatars, &mut self.rng);
        let id = palette::generate_player_id(&mut self.rng);
        let player = Player::new_guest(id.clone(), player_name, avatar, color);
        manager.add_player(player)?;
        Ok(id)
    }

    pub fn start_game(&mut self) -> Result<(), SessionError> {
        let result = self.start_game_inner();
        self.track(result)
    }

    fn start_game_inner(&mut self) -> Result<(), SessionError> {
        self.manager_or_err()?.start_game()?;
        if let Some(mut record) = store::load_json::<SessionRecord, _>(&*self.store, SESSION_KEY)? {
            record.game_phase = Some(GamePhase::Playing);
            store::save_json(&*self.store, SESSION_KEY, &record)?;
        }
        Ok(())
    }

    pub fn roll_dice(&mut self) -> Result<u8, SessionError> {
        let result = self
            .manager_or_err()
            .and_then(|m| m.roll_dice().map_err(SessionError::from));
        self.track(result)
    }

    pub fn move_player(&mut self, player_id: &PlayerId, steps: usize) -> Result<Tile, SessionError> {
        let result = self.move_player_inner(player_id, steps);
        self.track(result)
    }

    fn move_player_inner(&mut self, player_id: &PlayerId, steps: usize) -> Result<Tile, SessionError> {
        let tile = self.manager_or_err()?.move_player(player_id, steps)?;
        self.save_final_state()?;
        Ok(tile)
    }

    pub fn resolve_event(
        &mut self,
        player_id: &PlayerId,
        success: bool,
        choice: Option<&str>,
    ) -> Result<i32, SessionError> {
        let result = self.resolve_event_inner(player_id, success, choice);
        self.track(result)
    }

    fn resolve_event_inner(
        &mut self,
        player_id: &PlayerId,
        success: bool,
        choice: Option<&str>,
    ) -> Result<i32, SessionError> {
        let karma = self.manager_or_err()?.resolve_event(player_id, success, choice)?;
        self.save_final_state()?;
        Ok(karma)
    }

    /// Post a chat line as the player holding the device.
    pub fn send_chat_message(&mut self, message: &str) -> Result<(), SessionError> {
        let result = self.send_chat_inner(message);
        self.track(result)
    }

    fn send_chat_inner(&mut self, message: &str) -> Result<(), SessionError> {
        let (id, name) = self
            .current_player()
            .map(|p| (p.id.clone(), p.name.clone()))
            .ok_or(SessionError::NoGameState)?;
        self.manager_or_err()?.send_chat_message(&id, &name, message)?;
        Ok(())
    }

    /// Finish the game and keep the final state for the story screen.
    pub fn end_game(&mut self) -> Result<(), SessionError> {
        let result = self.end_game_inner();
        self.track(result)
    }

    fn end_game_inner(&mut self) -> Result<(), SessionError> {
        self.manager_or_err()?.end_game()?;
        self.save_final_state()
    }

    /// Once the game is over, by `end_game` or the round limit, keep its
    /// state for the story screen.
    fn save_final_state(&self) -> Result<(), SessionError> {
        let state = self.game_state().ok_or(SessionError::NoGameState)?;
        if state.phase == GamePhase::Finished {
            store::save_json(&*self.store, FINAL_GAME_KEY, state)?;
            debug!(game_id = %state.id, "saved final game state");
        }
        Ok(())
    }

    /// Final state for the story screen: the live game, else the saved final game.
    pub fn final_state(&self) -> Result<GameState, SessionError> {
        if let Some(state) = self.game_state() {
            return Ok(state.clone());
        }
        store::load_json(&*self.store, FINAL_GAME_KEY)?.ok_or(SessionError::NoGameState)
    }

    /// One story per player, ranked by karma. Generation failures for a
    /// player fall back to the canned story; they never abort the others.
    pub fn generate_stories(&mut self) -> Result<Vec<PlayerStory>, SessionError> {
        let state = match self.final_state() {
            Ok(state) => state,
            Err(e) => return self.track(Err(e)),
        };
        info!(players = state.player_count(), "generating stories");
        let winner_id = state.winner().map(|p| p.id.clone());

        let mut stories = Vec::with_capacity(state.player_count());
        for (rank, player) in state.standings().into_iter().enumerate() {
            let is_winner = winner_id.as_ref() == Some(&player.id);
            let request = StoryRequest {
                player_name: player.name.clone(),
                theme: state.theme.clone(),
                karma: player.karma,
                actions: player.actions.clone(),
                position: player.position,
                is_winner,
            };
            let (story, used_fallback) = match self.storyteller.generate_player_story(&request) {
                Ok(story) => (story, false),
                Err(e) => {
                    warn!(player = %player.name, error = %e, "story generation failed, using fallback");
                    (fallback_story(&player.name, &state.theme, player.karma), true)
                }
            };
            stories.push(PlayerStory {
                player_id: player.id.clone(),
                player_name: player.name.clone(),
                rank: rank + 1,
                karma: player.karma,
                is_winner,
                story,
                used_fallback,
            });
        }
        self.last_error = None;
        Ok(stories)
    }

    /// A theme suggestion; never fails.
    pub fn random_theme(&mut self) -> String {
        match self.storyteller.generate_random_theme() {
            Ok(theme) if !theme.trim().is_empty() => theme,
            Ok(_) => fallback_theme(&mut self.rng),
            Err(e) => {
                warn!(error = %e, "theme generation failed, using fallback theme");
                fallback_theme(&mut self.rng)
            }
        }
    }

    /// Forget everything this device stored about the last game.
    pub fn play_again(&mut self) -> Result<(), SessionError> {
        for key in [SESSION_KEY, GAME_STATE_KEY, CHAT_KEY, FINAL_GAME_KEY] {
            self.store.remove(key)?;
        }
        self.cleanup();
        Ok(())
    }

    /// Drop the current game. Session subscriptions stay registered and
    /// follow the next game.
    pub fn cleanup(&mut self) {
        debug!("cleaning up local session");
        if let Some(mut manager) = self.manager.take() {
            manager.cleanup();
        }
        self.player_id = None;
        self.last_error = None;
    }

    /// Subscribe to state changes of this and every later game. Fires
    /// immediately when a game state already exists.
    pub fn on_game_state_change<F>(&mut self, mut callback: F) -> ListenerId
    where
        F: FnMut(&GameState) + 'static,
    {
        if let Some(state) = self.game_state() {
            callback(state);
        }
        let id = self.next_listener_id();
        self.state_listeners.borrow_mut().push((id, Box::new(callback)));
        id
    }

    pub fn on_chat_messages<F>(&mut self, mut callback: F) -> ListenerId
    where
        F: FnMut(&[ChatMessage]) + 'static,
    {
        if let Some(manager) = self.manager.as_ref().filter(|m| !m.chat_messages().is_empty()) {
            callback(manager.chat_messages());
        }
        let id = self.next_listener_id();
        self.chat_listeners.borrow_mut().push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let mut states = self.state_listeners.borrow_mut();
        let mut chats = self.chat_listeners.borrow_mut();
        let before = states.len() + chats.len();
        states.retain(|(lid, _)| *lid != id);
        chats.retain(|(lid, _)| *lid != id);
        before != states.len() + chats.len()
    }

    fn next_listener_id(&mut self) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        id
    }

    /// Relay a new manager's notifications to the session subscribers.
    fn forward_notifications(&self, manager: &mut GameManager<S>) {
        let states = Rc::clone(&self.state_listeners);
        manager.on_game_state_change(move |state| {
            for (_, listener) in states.borrow_mut().iter_mut() {
                listener(state);
            }
        });
        let chats = Rc::clone(&self.chat_listeners);
        manager.on_chat_messages(move |messages| {
            for (_, listener) in chats.borrow_mut().iter_mut() {
                listener(messages);
            }
        });
    }

    fn manager_or_err(&mut self) -> Result<&mut GameManager<S>, SessionError> {
        self.manager.as_mut().ok_or(SessionError::NotInitialized)
    }

    fn track<R>(&mut self, result: Result<R, SessionError>) -> Result<R, SessionError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                error!(error = %e, "session operation failed");
                self.last_error = Some(e.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::core::storyteller::{GrammarStoryteller, StorytellerError};
    use crate::schema::board::Board;

    /// Storyteller whose service is always down.
    struct OfflineStoryteller;

    impl Storyteller for OfflineStoryteller {
        fn generate_board(&mut self, _: &str, _: usize) -> Result<Board, StorytellerError> {
            Err(StorytellerError::Unavailable("offline".to_string()))
        }

        fn generate_player_story(&mut self, _: &StoryRequest) -> Result<String, StorytellerError> {
            Err(StorytellerError::Unavailable("offline".to_string()))
        }

        fn generate_random_theme(&mut self) -> Result<String, StorytellerError> {
            Err(StorytellerError::Unavailable("offline".to_string()))
        }
    }

    fn config() -> GameConfig {
        GameConfig {
            board_length: 12,
            seed: Some(11),
            ..GameConfig::default()
        }
    }

    fn grammar_session(store: Rc<MemoryStore>) -> LocalSession<MemoryStore, GrammarStoryteller> {
        let teller = GrammarStoryteller::from_config(&config()).unwrap();
        LocalSession::new(store, teller, config())
    }

    #[test]
    fn initialize_reuses_matching_manager() {
        let mut session = grammar_session(Rc::new(MemoryStore::new()));
        let (game_id, player_id) = session.initialize(None, None);
        let again = session.initialize(Some(game_id.clone()), None);
        assert_eq!(again, (game_id.clone(), player_id.clone()));

        let other = session.initialize(Some(GameId("OTHER1".to_string())), None);
        assert_eq!(other.0, GameId("OTHER1".to_string()));
        assert_ne!(other.1, player_id);
    }

    #[test]
    fn create_game_writes_record() {
        let store = Rc::new(MemoryStore::new());
        let mut session = grammar_session(store.clone());
        let game_id = session.create_game("Ada", "Space Station Mystery").unwrap();

        let record: SessionRecord = store::load_json(&*store, SESSION_KEY).unwrap().unwrap();
        assert_eq!(record.game_id, game_id.0);
        assert_eq!(record.player_name, "Ada");
        assert!(record.is_host);
        assert_eq!(record.game_mode, "local");

        let host = session.current_player().unwrap();
        assert!(host.is_host);
        assert_eq!(session.game_state().unwrap().board.len(), 12);
    }

    #[test]
    fn create_game_validates_input() {
        let mut session = grammar_session(Rc::new(MemoryStore::new()));
        assert!(matches!(session.create_game("  ", "Theme"), Err(SessionError::EmptyName)));
        assert_eq!(session.last_error(), Some("player name is required"));
        assert!(matches!(session.create_game("Ada", ""), Err(SessionError::EmptyTheme)));
    }

    #[test]
    fn board_failure_uses_fallback_board() {
        let mut session = LocalSession::new(Rc::new(MemoryStore::new()), OfflineStoryteller, config());
        session.create_game("Ada", "Ghost Town Road Trip").unwrap();
        let board = &session.game_state().unwrap().board;
        assert_eq!(board.len(), 12);
        assert_eq!(board.tiles[1].title, "Crossroads");
    }

    #[test]
    fn add_player_picks_unused_palette() {
        let mut session = grammar_session(Rc::new(MemoryStore::new()));
        session.create_game("Ada", "Medieval Castle Quest").unwrap();
        session.add_player("Bo").unwrap();
        session.add_player("Cy").unwrap();

        let state = session.game_state().unwrap();
        let mut colors: Vec<&str> = state.players.values().map(|p| p.color.as_str()).collect();
        colors.sort();
        colors.dedup();
        assert_eq!(colors.len(), 3);
        assert_eq!(state.turn_order.len(), 3);
    }

    #[test]
    fn load_game_without_record_fails() {
        let mut session = grammar_session(Rc::new(MemoryStore::new()));
        assert!(matches!(session.load_game(), Err(SessionError::NoSavedGame)));
        assert_eq!(session.last_error(), Some("no local game data found"));
    }

    #[test]
    fn load_game_rejects_missing_id() {
        let store = Rc::new(MemoryStore::new());
        store
            .set(
                SESSION_KEY,
                r#"{"gameId":"","playerId":"p","playerName":"Ada","theme":"x","isHost":true,"gameMode":"local"}"#,
            )
            .unwrap();
        let mut session = grammar_session(store);
        assert!(matches!(session.load_game(), Err(SessionError::InvalidRecord(_))));
    }

    #[test]
    fn start_marks_record_playing() {
        let store = Rc::new(MemoryStore::new());
        let mut session = grammar_session(store.clone());
        session.create_game("Ada", "Underwater Treasure Hunt").unwrap();
        session.start_game().unwrap();
        let record: SessionRecord = store::load_json(&*store, SESSION_KEY).unwrap().unwrap();
        assert_eq!(record.game_phase, Some(GamePhase::Playing));
    }

    #[test]
    fn end_game_saves_final_state_and_stories_fall_back() {
        let store = Rc::new(MemoryStore::new());
        let mut session = LocalSession::new(store.clone(), OfflineStoryteller, config());
        session.create_game("Ada", "Jungle Safari Adventure").unwrap();
        session.add_player("Bo").unwrap();
        session.start_game().unwrap();
        session.end_game().unwrap();

        let saved: GameState = store::load_json(&*store, FINAL_GAME_KEY).unwrap().unwrap();
        assert_eq!(saved.phase, GamePhase::Finished);

        let stories = session.generate_stories().unwrap();
        assert_eq!(stories.len(), 2);
        assert!(stories.iter().all(|s| s.used_fallback));
        assert_eq!(stories[0].rank, 1);
        assert!(stories[0].is_winner);
        assert_eq!(stories[0].story, fallback_story("Ada", "Jungle Safari Adventure", 0));
    }

    #[test]
    fn random_theme_falls_back() {
        let mut session = LocalSession::new(Rc::new(MemoryStore::new()), OfflineStoryteller, config());
        let theme = session.random_theme();
        assert!(crate::core::storyteller::FALLBACK_THEMES.contains(&theme.as_str()));
    }

    #[test]
    fn play_again_clears_store() {
        let store = Rc::new(MemoryStore::new());
        let mut session = grammar_session(store.clone());
        session.create_game("Ada", "Space Station Mystery").unwrap();
        session.end_game().unwrap();
        session.play_again().unwrap();
        assert!(store.is_empty());
        assert!(session.manager().is_none());
    }

    #[test]
    fn subscriptions_follow_the_session_to_new_games() {
        let mut session = grammar_session(Rc::new(MemoryStore::new()));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        // Registered before any game exists.
        session.on_game_state_change(move |state| sink.borrow_mut().push(state.id.clone()));
        let lines = Rc::new(RefCell::new(0usize));
        let chat_sink = lines.clone();
        session.on_chat_messages(move |messages| *chat_sink.borrow_mut() = messages.len());

        let first = session.create_game("Ada", "Space Station Mystery").unwrap();
        assert_eq!(seen.borrow().last(), Some(&first));

        let other = GameId("OTHER1".to_string());
        session.initialize(Some(other.clone()), None);
        session.create_game("Bo", "Haunted Mansion Mystery").unwrap();
        assert_eq!(seen.borrow().last(), Some(&other));
        assert_eq!(*lines.borrow(), 1);
    }

    #[test]
    fn round_limit_saves_final_state() {
        let store = Rc::new(MemoryStore::new());
        let config = GameConfig {
            max_rounds: Some(1),
            ..config()
        };
        let mut session = LocalSession::new(store.clone(), OfflineStoryteller, config);
        session.create_game("Ada", "Jungle Safari Adventure").unwrap();
        let ada = session.player_id().cloned().unwrap();
        session.start_game().unwrap();

        // Fallback board: index 6 is a Rest tile, so one move ends the round.
        session.move_player(&ada, 6).unwrap();
        let saved: GameState = store::load_json(&*store, FINAL_GAME_KEY).unwrap().unwrap();
        assert_eq!(saved.phase, GamePhase::Finished);
        assert_eq!(&saved, session.game_state().unwrap());
    }

    #[test]
    fn operations_without_manager_fail() {
        let mut session = grammar_session(Rc::new(MemoryStore::new()));
        assert!(matches!(session.roll_dice(), Err(SessionError::NotInitialized)));
        assert!(matches!(session.send_chat_message("hi"), Err(SessionError::NoGameState)));
    }
}
