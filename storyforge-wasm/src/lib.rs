//! WASM bindings for storyforge: a local game backed by browser local storage.

use std::rc::Rc;
use tracing::warn;
use wasm_bindgen::prelude::*;

use storyforge::config::GameConfig;
use storyforge::core::manager::ListenerId;
use storyforge::core::session::LocalSession;
use storyforge::core::store::{KeyValueStore, StoreError};
use storyforge::core::storyteller::GrammarStoryteller;
use storyforge::schema::player::PlayerId;

// ---------------------------------------------------------------------------
// Browser local storage
// ---------------------------------------------------------------------------

/// `window.localStorage` behind the store trait.
pub struct BrowserStore {
    storage: web_sys::Storage,
}

impl BrowserStore {
    pub fn open() -> Result<Self, StoreError> {
        let window =
            web_sys::window().ok_or_else(|| StoreError::Backend("no window".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(backend_error)?
            .ok_or_else(|| StoreError::Backend("local storage unavailable".to_string()))?;
        Ok(Self { storage })
    }
}

fn backend_error(value: JsValue) -> StoreError {
    StoreError::Backend(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

impl KeyValueStore for BrowserStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage.get_item(key).map_err(backend_error)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage.set_item(key, value).map_err(backend_error)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.storage.remove_item(key).map_err(backend_error)
    }
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct CreatedGame {
    game_id: String,
    player_id: String,
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// LocalGame, the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct LocalGame {
    session: LocalSession<BrowserStore, GrammarStoryteller>,
}

#[wasm_bindgen]
impl LocalGame {
    /// Create a session over local storage with an entropy-seeded storyteller.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<LocalGame, JsError> {
        Self::build(GameConfig::default())
    }

    /// Create a session whose dice, ids and grammar choices are reproducible.
    pub fn with_seed(seed: u64) -> Result<LocalGame, JsError> {
        Self::build(GameConfig {
            seed: Some(seed),
            ..GameConfig::default()
        })
    }

    /// Create a session from a RON game config.
    pub fn with_config(config_ron: &str) -> Result<LocalGame, JsError> {
        let config = GameConfig::parse_ron(config_ron)
            .map_err(|e| JsError::new(&format!("Config error: {e}")))?;
        Self::build(config)
    }

    /// Host a new game. Returns `{"game_id", "player_id"}` as JSON.
    pub fn create_game(&mut self, player_name: &str, theme: &str) -> Result<String, JsError> {
        let game_id = self.session.create_game(player_name, theme).map_err(js_error)?;
        let player_id = self
            .session
            .player_id()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        to_json(&CreatedGame {
            game_id: game_id.0,
            player_id,
        })
    }

    /// Resume the game saved in local storage.
    pub fn load_game(&mut self) -> Result<(), JsError> {
        self.session.load_game().map_err(js_error)
    }

    /// Seat another player. Returns the new player id.
    pub fn add_player(&mut self, player_name: &str) -> Result<String, JsError> {
        self.session
            .add_player(player_name)
            .map(|id| id.0)
            .map_err(js_error)
    }

    pub fn start_game(&mut self) -> Result<(), JsError> {
        self.session.start_game().map_err(js_error)
    }

    pub fn roll_dice(&mut self) -> Result<u8, JsError> {
        self.session.roll_dice().map_err(js_error)
    }

    /// Move a player. Returns the tile landed on as JSON.
    pub fn move_player(&mut self, player_id: &str, steps: usize) -> Result<String, JsError> {
        let tile = self
            .session
            .move_player(&PlayerId::from(player_id), steps)
            .map_err(js_error)?;
        to_json(&tile)
    }

    /// Resolve the pending event. Returns the player's new karma.
    pub fn resolve_event(
        &mut self,
        player_id: &str,
        success: bool,
        choice: Option<String>,
    ) -> Result<i32, JsError> {
        self.session
            .resolve_event(&PlayerId::from(player_id), success, choice.as_deref())
            .map_err(js_error)
    }

    pub fn send_chat_message(&mut self, message: &str) -> Result<(), JsError> {
        self.session.send_chat_message(message).map_err(js_error)
    }

    pub fn end_game(&mut self) -> Result<(), JsError> {
        self.session.end_game().map_err(js_error)
    }

    /// Ranked end-of-game stories as a JSON array.
    pub fn generate_stories(&mut self) -> Result<String, JsError> {
        let stories = self.session.generate_stories().map_err(js_error)?;
        to_json(&stories)
    }

    pub fn random_theme(&mut self) -> String {
        self.session.random_theme()
    }

    /// Current game state as JSON, or `null` before a game exists.
    pub fn state(&self) -> Result<String, JsError> {
        to_json(&self.session.game_state())
    }

    /// Chat history as a JSON array.
    pub fn chat(&self) -> Result<String, JsError> {
        let messages = self
            .session
            .manager()
            .map(|m| m.chat_messages())
            .unwrap_or_default();
        to_json(messages)
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.last_error().map(str::to_string)
    }

    /// Call `callback(stateJson)` on every state change, including games
    /// created after subscribing.
    pub fn on_game_state_change(&mut self, callback: js_sys::Function) -> ListenerId {
        self.session.on_game_state_change(move |state| match serde_json::to_string(state) {
            Ok(json) => call_listener(&callback, &json, "game state"),
            Err(e) => warn!(error = %e, "failed to serialize game state for listener"),
        })
    }

    /// Call `callback(messagesJson)` whenever the chat history changes.
    pub fn on_chat_messages(&mut self, callback: js_sys::Function) -> ListenerId {
        self.session.on_chat_messages(move |messages| match serde_json::to_string(messages) {
            Ok(json) => call_listener(&callback, &json, "chat"),
            Err(e) => warn!(error = %e, "failed to serialize chat for listener"),
        })
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.session.unsubscribe(id)
    }

    /// Clear everything stored about the last game.
    pub fn play_again(&mut self) -> Result<(), JsError> {
        self.session.play_again().map_err(js_error)
    }
}

// Private helpers
impl LocalGame {
    fn build(config: GameConfig) -> Result<LocalGame, JsError> {
        let store = BrowserStore::open().map_err(js_error)?;
        let storyteller = GrammarStoryteller::from_config(&config)
            .map_err(|e| JsError::new(&format!("Storyteller build error: {e}")))?;
        Ok(LocalGame {
            session: LocalSession::new(Rc::new(store), storyteller, config),
        })
    }
}

fn call_listener(callback: &js_sys::Function, json: &str, topic: &str) {
    if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(json)) {
        warn!(topic, error = ?e, "listener callback threw");
    }
}

fn js_error<E: std::fmt::Display>(e: E) -> JsError {
    JsError::new(&e.to_string())
}
