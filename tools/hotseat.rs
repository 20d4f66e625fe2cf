/// Hotseat: play a local StoryForge game in the terminal, passing the
/// keyboard around the table.
///
/// Commands:
///   add <name>        seat another player (lobby only)
///   start             start the game
///   roll              roll the dice and move the current player
///   choose <n>        resolve the pending event with choice n (1 is the noble path)
///   fail              resolve the pending event as a failure
///   say <text>        chat as the host
///   status            show the board position and karma of everyone
///   end               finish the game and tell everyone's story
///   help              list commands
///   quit              exit (the game stays saved)

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use storyforge::config::GameConfig;
use storyforge::core::session::LocalSession;
use storyforge::core::store::FileStore;
use storyforge::core::storyteller::GrammarStoryteller;
use storyforge::schema::game::{GamePhase, GameState};

#[derive(Debug, Parser)]
#[command(name = "hotseat", about = "Pass-the-keyboard StoryForge game")]
struct Args {
    /// Directory the game is saved to.
    #[arg(long, default_value = ".storyforge")]
    data_dir: PathBuf,
    /// RON game config.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Extra grammar merged over the built-in one.
    #[arg(long)]
    grammar: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    /// Theme for a new game; a random one is suggested when omitted.
    #[arg(long)]
    theme: Option<String>,
    /// Host name for a new game.
    #[arg(long, default_value = "Host")]
    name: String,
    /// Start a new game even if one is saved.
    #[arg(long)]
    new: bool,
}

type Session = LocalSession<FileStore, GrammarStoryteller>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut session = build_session(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let resumed = !args.new && session.load_game().is_ok() && session.game_state().is_some();
    if resumed {
        println!("Resumed saved game.");
    } else {
        let theme = args.theme.clone().unwrap_or_else(|| session.random_theme());
        match session.create_game(&args.name, &theme) {
            Ok(id) => println!("Created game {} — theme: {}", id, theme),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        if let Some(state) = session.game_state() {
            println!("{}", state.board.story_context);
        }
    }
    print_status(&session);

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            "add" => match session.add_player(rest) {
                Ok(_) => print_status(&session),
                Err(e) => println!("Cannot add player: {}", e),
            },
            "start" => match session.start_game() {
                Ok(()) => print_status(&session),
                Err(e) => println!("Cannot start: {}", e),
            },
            "roll" => roll(&mut session),
            "choose" => match rest.trim().parse::<usize>() {
                Ok(n) if n > 0 => resolve(&mut session, Some(n)),
                _ => println!("Usage: choose <n>"),
            },
            "fail" => resolve(&mut session, None),
            "say" => {
                if let Err(e) = session.send_chat_message(rest) {
                    println!("Cannot send: {}", e);
                } else if let Some(msg) = session.manager().and_then(|m| m.chat_messages().last()) {
                    println!("[{}] {}", msg.player_name, msg.message);
                }
            }
            "status" => print_status(&session),
            "end" => {
                if let Err(e) = session.end_game() {
                    println!("Cannot end: {}", e);
                    continue;
                }
                tell_stories(&mut session);
                break;
            }
            "help" => print_help(),
            "quit" | "exit" => break,
            other => println!("Unknown command '{}'. Type 'help'.", other),
        }

        if session.game_state().map(|s| s.phase) == Some(GamePhase::Finished) {
            println!("The final round is over!");
            tell_stories(&mut session);
            break;
        }
    }
}

fn build_session(args: &Args) -> Result<Session, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => GameConfig::load_from_ron(path)?,
        None => GameConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let mut builder = GrammarStoryteller::builder()
        .board_length(config.board_length)
        .karma(config.karma.clone());
    if let Some(seed) = config.seed {
        builder = builder.seed(seed);
    }
    if let Some(ref grammar) = args.grammar {
        builder = builder.grammar_file(grammar);
    }
    let storyteller = builder.build()?;
    let store = Rc::new(FileStore::open(&args.data_dir)?);
    Ok(LocalSession::new(store, storyteller, config))
}

fn roll(session: &mut Session) {
    let Some(player_id) = session
        .game_state()
        .and_then(GameState::current_player_id)
        .cloned()
    else {
        println!("No game in progress.");
        return;
    };
    let total = match session.roll_dice() {
        Ok(total) => total,
        Err(e) => {
            println!("Cannot roll: {}", e);
            return;
        }
    };
    println!("Rolled {}.", total);
    match session.move_player(&player_id, total as usize) {
        Ok(tile) => {
            println!("Landed on #{} {} ({})", tile.index, tile.title, tile.kind.name());
            println!("  {}", tile.description);
            if tile.requires_resolution() {
                for (i, choice) in tile.choices.iter().enumerate() {
                    println!("  {}. {}", i + 1, choice);
                }
                if tile.choices.is_empty() {
                    println!("  choose 1 to embrace it, or fail");
                }
            } else {
                print_turn(session);
            }
        }
        Err(e) => println!("Cannot move: {}", e),
    }
}

fn resolve(session: &mut Session, choice: Option<usize>) {
    let Some(pending) = session.game_state().and_then(|s| s.pending_event.clone()) else {
        println!("Nothing to resolve.");
        return;
    };
    let choice_text = choice.and_then(|n| {
        session
            .game_state()
            .and_then(|s| s.board.tile(pending.tile_index))
            .and_then(|t| t.choices.get(n - 1).cloned())
    });
    let success = choice == Some(1);
    match session.resolve_event(&pending.player_id, success, choice_text.as_deref()) {
        Ok(karma) => {
            println!("{} — karma now {}", if success { "Success" } else { "Failure" }, karma);
            print_turn(session);
        }
        Err(e) => println!("Cannot resolve: {}", e),
    }
}

fn print_turn(session: &Session) {
    if let Some(player) = session.game_state().and_then(GameState::current_player) {
        println!("{} {}, it's your turn.", player.avatar, player.name);
    }
}

fn print_status(session: &Session) {
    let Some(state) = session.game_state() else {
        println!("No game loaded.");
        return;
    };
    println!(
        "Game {} — {} — {} (round {})",
        state.id,
        state.theme,
        state.phase.name(),
        state.round
    );
    for (i, id) in state.turn_order.iter().enumerate() {
        if let Some(p) = state.players.get(id) {
            let marker = if i == state.current_turn && state.phase == GamePhase::Playing {
                "▶"
            } else {
                " "
            };
            println!(
                "{} {} {:<12} karma {:>4}  tile {:>2}",
                marker, p.avatar, p.name, p.karma, p.position
            );
        }
    }
}

fn tell_stories(session: &mut Session) {
    match session.generate_stories() {
        Ok(stories) => {
            for story in stories {
                println!();
                println!(
                    "#{} {}{} — {} karma",
                    story.rank,
                    story.player_name,
                    if story.is_winner { " 👑" } else { "" },
                    story.karma
                );
                println!("{}", story.story);
            }
        }
        Err(e) => println!("No stories: {}", e),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  add <name>   seat another player (lobby only)");
    println!("  start        start the game");
    println!("  roll         roll the dice and move");
    println!("  choose <n>   resolve the event with choice n");
    println!("  fail         resolve the event as a failure");
    println!("  say <text>   chat");
    println!("  status       show standings");
    println!("  end          finish and tell the stories");
    println!("  quit         exit (game stays saved)");
}
