/// Session integration tests: full games persisted to disk and resumed.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use storyforge::config::GameConfig;
use storyforge::core::manager::GameError;
use storyforge::core::session::{LocalSession, SessionError};
use storyforge::core::store::{self, FileStore, KeyValueStore, CHAT_KEY, FINAL_GAME_KEY, GAME_STATE_KEY};
use storyforge::core::storyteller::GrammarStoryteller;
use storyforge::schema::game::{GamePhase, GameState, MessageKind};

type Session = LocalSession<FileStore, GrammarStoryteller>;

fn config() -> GameConfig {
    GameConfig::load_from_ron(Path::new("tests/fixtures/config.ron")).unwrap()
}

fn open_session(dir: &Path) -> Session {
    let config = config();
    let teller = GrammarStoryteller::from_config(&config).unwrap();
    let store = Rc::new(FileStore::open(dir).unwrap());
    LocalSession::new(store, teller, config)
}

/// Roll, move and resolve for whoever's turn it is.
fn play_turn(session: &mut Session, succeed: bool) {
    let player_id = session
        .game_state()
        .and_then(GameState::current_player_id)
        .cloned()
        .unwrap();
    let steps = session.roll_dice().unwrap();
    assert!((2..=12).contains(&steps));
    let tile = session.move_player(&player_id, steps as usize).unwrap();
    if tile.requires_resolution() {
        let choice = tile.choices.first().cloned();
        session
            .resolve_event(&player_id, succeed, choice.as_deref())
            .unwrap();
    }
}

#[test]
fn fixture_config_loads() {
    let config = config();
    assert_eq!(config.board_length, 12);
    assert_eq!(config.max_rounds, Some(3));
    assert_eq!(config.karma.event.success, 20);
    // Unlisted kinds keep their defaults.
    assert_eq!(config.karma.challenge.success, 15);
}

#[test]
fn full_game_ends_after_round_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    session.create_game("Ada", "Haunted Lighthouse Rescue").unwrap();
    session.add_player("Bo").unwrap();
    session.start_game().unwrap();

    let mut turns = 0;
    while session.game_state().unwrap().phase == GamePhase::Playing {
        play_turn(&mut session, turns % 2 == 0);
        turns += 1;
        assert!(turns <= 6, "game did not finish");
    }
    assert_eq!(turns, 6);

    let state = session.game_state().unwrap();
    assert_eq!(state.phase, GamePhase::Finished);
    assert_eq!(state.round, 3);
    assert!(state.pending_event.is_none());
    for player in state.players.values() {
        assert!(player.position < 12);
        assert!(player.actions.iter().any(|a| a.starts_with("Rolled")));
    }

    // The round limit alone leaves the story screen what it needs.
    let store = FileStore::open(dir.path()).unwrap();
    let saved: GameState = store::load_json(&store, FINAL_GAME_KEY).unwrap().unwrap();
    assert_eq!(&saved, state);
    let winner = state.winner().unwrap();
    let announcement = session.manager().unwrap().chat_messages().last().unwrap();
    assert_eq!(announcement.kind, MessageKind::System);
    assert_eq!(
        announcement.message,
        format!("{} wins with {} karma!", winner.name, winner.karma)
    );

    session.end_game().unwrap();
    let stories = session.generate_stories().unwrap();
    assert_eq!(stories.len(), 2);
    assert!(stories.iter().all(|s| !s.used_fallback));
    assert!(stories[0].karma >= stories[1].karma);
    assert!(stories[0].is_winner);
    assert!(!stories[1].is_winner);
    for story in &stories {
        assert!(story.story.contains(&story.player_name));
    }
}

#[test]
fn saved_game_resumes_mid_turn() {
    let dir = tempfile::tempdir().unwrap();
    let (game_id, before) = {
        let mut session = open_session(dir.path());
        let game_id = session.create_game("Ada", "Enchanted Carnival Heist").unwrap();
        session.add_player("Bo").unwrap();
        session.start_game().unwrap();
        session.roll_dice().unwrap();
        (game_id, session.game_state().unwrap().clone())
    };

    let mut resumed = open_session(dir.path());
    resumed.load_game().unwrap();
    assert_eq!(resumed.manager().unwrap().game_id(), &game_id);
    assert_eq!(resumed.game_state().unwrap(), &before);
    assert_eq!(resumed.current_player().unwrap().name, "Ada");

    // The roll survived the reload.
    assert!(matches!(
        resumed.roll_dice(),
        Err(SessionError::Game(GameError::AlreadyRolled))
    ));

    let chat = resumed.manager().unwrap().chat_messages();
    assert!(chat.iter().all(|m| m.kind == MessageKind::System));
    assert_eq!(chat.len(), 3);
}

#[test]
fn lobby_enforces_seat_and_start_limits() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    session.create_game("Ada", "Neon Library Escape").unwrap();

    assert!(matches!(
        session.start_game(),
        Err(SessionError::Game(GameError::NotEnoughPlayers { required: 2, actual: 1 }))
    ));

    session.add_player("Bo").unwrap();
    session.add_player("Cy").unwrap();
    assert!(matches!(
        session.add_player("Di"),
        Err(SessionError::Game(GameError::GameFull(3)))
    ));
    assert!(session.last_error().is_some());

    session.start_game().unwrap();
    assert!(session.last_error().is_none());
    assert!(matches!(
        session.add_player("Di"),
        Err(SessionError::Game(GameError::WrongPhase { .. }))
    ));
}

#[test]
fn listeners_see_every_state_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    session.create_game("Ada", "Sunken Moon Base Treasure Hunt").unwrap();

    let phases = Rc::new(RefCell::new(Vec::new()));
    let seen = phases.clone();
    let id = session.on_game_state_change(move |state| seen.borrow_mut().push(state.phase));
    // Fires right away with the existing state.
    assert_eq!(*phases.borrow(), vec![GamePhase::Waiting]);

    session.add_player("Bo").unwrap();
    session.start_game().unwrap();
    assert_eq!(phases.borrow().last(), Some(&GamePhase::Playing));

    let count = phases.borrow().len();
    assert!(session.unsubscribe(id));
    session.end_game().unwrap();
    assert_eq!(phases.borrow().len(), count);
}

#[test]
fn listeners_carry_over_to_the_next_game() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    session.create_game("Ada", "Clockwork Zoo Breakout").unwrap();

    let seen: Rc<RefCell<Vec<(String, usize)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    session.on_game_state_change(move |state| {
        sink.borrow_mut().push((state.theme.clone(), state.player_count()))
    });
    let chat_lines = Rc::new(RefCell::new(Vec::new()));
    let chat_sink = chat_lines.clone();
    session.on_chat_messages(move |messages| {
        if let Some(last) = messages.last() {
            chat_sink.borrow_mut().push(last.message.clone());
        }
    });
    let before = seen.borrow().len();

    session.play_again().unwrap();
    session.create_game("Bo", "Velvet Desert Caravan").unwrap();
    session.add_player("Cy").unwrap();

    let seen = seen.borrow();
    assert!(seen.len() > before);
    assert_eq!(seen.last(), Some(&("Velvet Desert Caravan".to_string(), 2)));
    assert_eq!(chat_lines.borrow().last().map(String::as_str), Some("Cy joined the game"));
}

#[test]
fn chat_is_persisted_and_restored() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut session = open_session(dir.path());
        session.create_game("Ada", "Crooked Tower Rescue").unwrap();
        session.send_chat_message("  good luck everyone  ").unwrap();
        assert!(matches!(
            session.send_chat_message("   "),
            Err(SessionError::Game(GameError::EmptyMessage))
        ));
    }

    let mut resumed = open_session(dir.path());
    resumed.load_game().unwrap();
    let chat = resumed.manager().unwrap().chat_messages();
    let last = chat.last().unwrap();
    assert_eq!(last.message, "good luck everyone");
    assert_eq!(last.player_name, "Ada");
    assert_eq!(last.kind, MessageKind::Chat);
}

#[test]
fn play_again_forgets_the_game() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    session.create_game("Ada", "Frozen Carnival Escape").unwrap();
    session.add_player("Bo").unwrap();
    session.start_game().unwrap();
    session.end_game().unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    let saved: GameState = store::load_json(&store, FINAL_GAME_KEY).unwrap().unwrap();
    assert_eq!(saved.phase, GamePhase::Finished);

    session.play_again().unwrap();
    for key in [GAME_STATE_KEY, CHAT_KEY, FINAL_GAME_KEY] {
        assert_eq!(store.get(key).unwrap(), None);
    }

    let mut fresh = open_session(dir.path());
    assert!(matches!(fresh.load_game(), Err(SessionError::NoSavedGame)));
}
