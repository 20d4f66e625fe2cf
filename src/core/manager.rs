/// The local game manager: turn order, dice, movement, events and karma.
///
/// Every mutation rewrites the whole `GameState` to the store and then
/// notifies state subscribers. Chat lives beside the state under its own key.

use chrono::Utc;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::core::dice::Dice;
use crate::core::store::{self, KeyValueStore, StoreError, CHAT_KEY, GAME_STATE_KEY};
use crate::core::storyteller::{validate_board, StorytellerError};
use crate::schema::board::{Board, Tile};
use crate::schema::game::{ChatMessage, GameId, GamePhase, GameState, MessageKind, PendingEvent};
use crate::schema::player::{Player, PlayerId};

/// Oldest chat lines are dropped beyond this many.
pub const MAX_CHAT_HISTORY: usize = 200;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("no game has been created or loaded")]
    NoGame,
    #[error("game is {actual:?}, expected {expected:?}")]
    WrongPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    #[error("game is full ({0} players)")]
    GameFull(usize),
    #[error("player already in game: {0}")]
    DuplicatePlayer(PlayerId),
    #[error("player not found: {0}")]
    PlayerNotFound(PlayerId),
    #[error("not {0}'s turn")]
    NotYourTurn(PlayerId),
    #[error("need at least {required} players, have {actual}")]
    NotEnoughPlayers { required: usize, actual: usize },
    #[error("dice already rolled this turn")]
    AlreadyRolled,
    #[error("an event is waiting to be resolved")]
    EventPending,
    #[error("no pending event for player {0}")]
    NoPendingEvent(PlayerId),
    #[error("chat message is empty")]
    EmptyMessage,
    #[error("board rejected: {0}")]
    Board(#[from] StorytellerError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type ListenerId = u64;

type StateListener = Box<dyn FnMut(&GameState)>;
type ChatListener = Box<dyn FnMut(&[ChatMessage])>;

pub struct GameManager<S: KeyValueStore + ?Sized> {
    game_id: GameId,
    store: Rc<S>,
    config: GameConfig,
    dice: Dice,
    state: Option<GameState>,
    chat: Vec<ChatMessage>,
    state_listeners: Vec<(ListenerId, StateListener)>,
    chat_listeners: Vec<(ListenerId, ChatListener)>,
    next_listener: ListenerId,
    next_message: u64,
}

impl<S: KeyValueStore + ?Sized> GameManager<S> {
    pub fn new(game_id: GameId, store: Rc<S>, config: GameConfig) -> Self {
        let dice = Dice::new(config.seed);
        Self {
            game_id,
            store,
            config,
            dice,
            state: None,
            chat: Vec::new(),
            state_listeners: Vec::new(),
            chat_listeners: Vec::new(),
            next_listener: 1,
            next_message: 1,
        }
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn game_state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn chat_messages(&self) -> &[ChatMessage] {
        &self.chat
    }

    /// Start a fresh game in the lobby with `host` as the only player.
    pub fn create_game(&mut self, host: Player, theme: &str, board: Board) -> Result<GameId, GameError> {
        validate_board(&board)?;
        let host_id = host.id.clone();
        let host_name = host.name.clone();
        let mut players = BTreeMap::new();
        players.insert(host_id.clone(), host);

        self.state = Some(GameState {
            id: self.game_id.clone(),
            theme: theme.to_string(),
            players,
            turn_order: vec![host_id],
            current_turn: 0,
            round: 0,
            board,
            phase: GamePhase::Waiting,
            last_roll: None,
            pending_event: None,
            created_at: Utc::now(),
        });
        self.chat.clear();
        info!(game_id = %self.game_id, theme, "game created");
        self.commit()?;
        self.post_system(format!("{} created the game", host_name))?;
        Ok(self.game_id.clone())
    }

    /// Seat another player. Only allowed while the game is waiting.
    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        let max_players = self.config.max_players;
        let state = self.playable_state(GamePhase::Waiting)?;
        if state.players.len() >= max_players {
            return Err(GameError::GameFull(max_players));
        }
        if state.players.contains_key(&player.id) {
            return Err(GameError::DuplicatePlayer(player.id));
        }
        let name = player.name.clone();
        debug!(player_id = %player.id, name = %name, "adding player");
        state.turn_order.push(player.id.clone());
        state.players.insert(player.id.clone(), player);
        self.commit()?;
        self.post_system(format!("{} joined the game", name))?;
        Ok(())
    }

    pub fn start_game(&mut self) -> Result<(), GameError> {
        let min_players = self.config.min_players;
        let state = self.playable_state(GamePhase::Waiting)?;
        if state.player_count() < min_players {
            return Err(GameError::NotEnoughPlayers {
                required: min_players,
                actual: state.player_count(),
            });
        }
        state.phase = GamePhase::Playing;
        state.current_turn = 0;
        state.round = 1;
        state.last_roll = None;
        state.pending_event = None;
        for player in state.players.values_mut() {
            player.position = 0;
        }
        info!(game_id = %state.id, players = state.player_count(), "game started");
        self.commit()?;
        self.post_system("The adventure begins!".to_string())?;
        Ok(())
    }

    /// Roll two dice for the current player and return the total.
    pub fn roll_dice(&mut self) -> Result<u8, GameError> {
        let state = self.playable_state(GamePhase::Playing)?;
        if state.pending_event.is_some() {
            return Err(GameError::EventPending);
        }
        if state.last_roll.is_some() {
            return Err(GameError::AlreadyRolled);
        }
        let current = state.current_player_id().cloned().ok_or(GameError::NoGame)?;

        // Only accepted rolls consume dice.
        let roll = self.dice.roll();
        let state = self.state.as_mut().ok_or(GameError::NoGame)?;
        state.last_roll = Some(roll);
        if let Some(player) = state.players.get_mut(&current) {
            player.record_action(format!("Rolled {} ({} + {})", roll.total(), roll.dice[0], roll.dice[1]));
        }
        debug!(player_id = %current, total = roll.total(), "dice rolled");
        self.commit()?;
        Ok(roll.total())
    }

    /// Walk the current player `steps` tiles and return the tile landed on.
    ///
    /// Tiles that need resolving become the pending event; any other tile
    /// ends the turn.
    pub fn move_player(&mut self, player_id: &PlayerId, steps: usize) -> Result<Tile, GameError> {
        let max_rounds = self.config.max_rounds;
        let state = self.playable_state(GamePhase::Playing)?;
        if !state.players.contains_key(player_id) {
            return Err(GameError::PlayerNotFound(player_id.clone()));
        }
        if !state.is_players_turn(player_id) {
            return Err(GameError::NotYourTurn(player_id.clone()));
        }
        if state.pending_event.is_some() {
            return Err(GameError::EventPending);
        }

        let from = state.players[player_id].position;
        let to = state.board.advance(from, steps);
        let tile = state
            .board
            .tile(to)
            .cloned()
            .ok_or_else(|| GameError::Board(StorytellerError::InvalidBoard("empty board".to_string())))?;

        if let Some(player) = state.players.get_mut(player_id) {
            player.position = to;
            player.record_action(format!("Landed on {}", tile.title));
        }
        debug!(player_id = %player_id, from, to, kind = tile.kind.name(), "player moved");

        if tile.requires_resolution() {
            state.pending_event = Some(PendingEvent {
                player_id: player_id.clone(),
                tile_index: to,
            });
            self.commit()?;
        } else if Self::advance_turn(state, max_rounds) {
            self.finish()?;
        } else {
            self.commit()?;
        }
        Ok(tile)
    }

    /// Apply the pending event's karma for `player_id` and pass the turn.
    pub fn resolve_event(
        &mut self,
        player_id: &PlayerId,
        success: bool,
        choice: Option<&str>,
    ) -> Result<i32, GameError> {
        let max_rounds = self.config.max_rounds;
        let state = self.playable_state(GamePhase::Playing)?;
        let pending = match &state.pending_event {
            Some(pending) if &pending.player_id == player_id => pending.clone(),
            _ => return Err(GameError::NoPendingEvent(player_id.clone())),
        };
        let tile = state
            .board
            .tile(pending.tile_index)
            .cloned()
            .ok_or_else(|| GameError::Board(StorytellerError::InvalidBoard("empty board".to_string())))?;
        let delta = tile.karma_delta(success);

        let player = state
            .players
            .get_mut(player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.clone()))?;
        if let Some(choice) = choice.map(str::trim).filter(|c| !c.is_empty()) {
            player.record_action(format!("Chose: {}", choice));
        }
        player.record_action(format!(
            "{} {} ({:+} karma)",
            if success { "Overcame" } else { "Failed" },
            tile.title,
            delta
        ));
        player.adjust_karma(delta);
        let karma = player.karma;
        debug!(player_id = %player_id, success, delta, karma, "event resolved");

        state.pending_event = None;
        if Self::advance_turn(state, max_rounds) {
            self.finish()?;
        } else {
            self.commit()?;
        }
        Ok(karma)
    }

    pub fn send_chat_message(
        &mut self,
        player_id: &PlayerId,
        player_name: &str,
        message: &str,
    ) -> Result<(), GameError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(GameError::EmptyMessage);
        }
        self.push_message(Some(player_id.clone()), player_name, message, MessageKind::Chat)
    }

    pub fn end_game(&mut self) -> Result<(), GameError> {
        self.finish()
    }

    /// Replace the in-memory state with a previously persisted one.
    pub fn load_game_state(&mut self, state: GameState) {
        if state.id != self.game_id {
            warn!(stored = %state.id, expected = %self.game_id, "loaded state belongs to another game id");
            self.game_id = state.id.clone();
        }
        self.state = Some(state);
        self.notify_state();
    }

    /// Reload chat history from the store, if any was saved.
    pub fn restore_chat(&mut self) -> Result<(), GameError> {
        if let Some(chat) = store::load_json::<Vec<ChatMessage>, _>(&*self.store, CHAT_KEY)? {
            self.next_message = chat.iter().map(|m| m.id).max().unwrap_or(0) + 1;
            self.chat = chat;
            self.notify_chat();
        }
        Ok(())
    }

    /// Subscribe to state changes. The callback fires immediately when a
    /// state already exists.
    pub fn on_game_state_change<F>(&mut self, mut callback: F) -> ListenerId
    where
        F: FnMut(&GameState) + 'static,
    {
        if let Some(state) = &self.state {
            callback(state);
        }
        let id = self.next_listener_id();
        self.state_listeners.push((id, Box::new(callback)));
        id
    }

    pub fn on_chat_messages<F>(&mut self, mut callback: F) -> ListenerId
    where
        F: FnMut(&[ChatMessage]) + 'static,
    {
        if !self.chat.is_empty() {
            callback(self.chat.as_slice());
        }
        let id = self.next_listener_id();
        self.chat_listeners.push((id, Box::new(callback)));
        id
    }

    /// Remove a listener registered with either subscribe method.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.state_listeners.len() + self.chat_listeners.len();
        self.state_listeners.retain(|(lid, _)| *lid != id);
        self.chat_listeners.retain(|(lid, _)| *lid != id);
        before != self.state_listeners.len() + self.chat_listeners.len()
    }

    /// Drop listeners and in-memory state. The store is left untouched.
    pub fn cleanup(&mut self) {
        debug!(game_id = %self.game_id, "cleaning up game manager");
        self.state_listeners.clear();
        self.chat_listeners.clear();
        self.state = None;
        self.chat.clear();
    }

    fn next_listener_id(&mut self) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        id
    }

    fn playable_state(&mut self, expected: GamePhase) -> Result<&mut GameState, GameError> {
        let state = self.state.as_mut().ok_or(GameError::NoGame)?;
        if state.phase != expected {
            return Err(GameError::WrongPhase {
                expected,
                actual: state.phase,
            });
        }
        Ok(state)
    }

    /// Pass the turn to the next seat, bumping the round on wrap-around.
    ///
    /// Returns true when the round limit was passed; the round is clamped and
    /// the caller finishes the game.
    fn advance_turn(state: &mut GameState, max_rounds: Option<u32>) -> bool {
        let count = state.player_count();
        if count == 0 {
            return false;
        }
        state.last_roll = None;
        state.current_turn = (state.current_turn + 1) % count;
        if state.current_turn != 0 {
            return false;
        }
        state.round += 1;
        match max_rounds {
            Some(max_rounds) if state.round > max_rounds => {
                info!(game_id = %state.id, rounds = max_rounds, "round limit reached");
                state.round = max_rounds;
                true
            }
            _ => false,
        }
    }

    /// Mark the game finished, persist it and announce the winner once.
    fn finish(&mut self) -> Result<(), GameError> {
        let state = self.state.as_mut().ok_or(GameError::NoGame)?;
        let announce = state.phase != GamePhase::Finished;
        state.phase = GamePhase::Finished;
        state.pending_event = None;
        let winner = state.winner().map(|p| (p.name.clone(), p.karma));
        info!(game_id = %self.game_id, "game ended");
        self.commit()?;
        if let (true, Some((name, karma))) = (announce, winner) {
            self.post_system(format!("{} wins with {} karma!", name, karma))?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), GameError> {
        if let Some(state) = &self.state {
            store::save_json(&*self.store, GAME_STATE_KEY, state)?;
        }
        self.notify_state();
        Ok(())
    }

    fn notify_state(&mut self) {
        if let Some(state) = &self.state {
            for (_, listener) in self.state_listeners.iter_mut() {
                listener(state);
            }
        }
    }

    fn notify_chat(&mut self) {
        for (_, listener) in self.chat_listeners.iter_mut() {
            listener(self.chat.as_slice());
        }
    }

    fn post_system(&mut self, message: String) -> Result<(), GameError> {
        self.push_message(None, "StoryForge", &message, MessageKind::System)
    }

    fn push_message(
        &mut self,
        player_id: Option<PlayerId>,
        player_name: &str,
        message: &str,
        kind: MessageKind,
    ) -> Result<(), GameError> {
        let id = self.next_message;
        self.next_message += 1;
        self.chat.push(ChatMessage {
            id,
            player_id,
            player_name: player_name.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            kind,
        });
        if self.chat.len() > MAX_CHAT_HISTORY {
            let excess = self.chat.len() - MAX_CHAT_HISTORY;
            self.chat.drain(..excess);
        }
        store::save_json(&*self.store, CHAT_KEY, &self.chat)?;
        self.notify_chat();
        Ok(())
    }
}
