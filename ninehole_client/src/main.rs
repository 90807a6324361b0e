// Terminal front-end for Nine Holes.
//
// Connects to the authority, then reads one command per line from stdin and
// redraws whenever the session's revision changes. Stdin is read on its own
// thread and handed over through a channel, so the main loop keeps applying
// pushed events while the user is typing. Logs go to stderr (filter with
// `RUST_LOG`) so they never interleave with the board on stdout.
//
// Usage:
//   ninehole [OPTIONS]
//     --server <URL>        Authority base URL (default: $NINEHOLE_SERVER,
//                           then http://localhost:8080)
//     --channel-url <URL>   Notification channel (default: derived, ws://…/ws)
//     --join <LINK|ID>      Join this lobby as soon as connected
//     --identity <ID>       Reuse a participant id instead of being issued one
//
// Commands at the prompt:
//   create            create a lobby
//   join <ID|LINK>    join a lobby
//   <n> | click <n>   click board position n (0 = center, 1-8 around)
//   leave             leave the lobby
//   help              list commands
//   quit              exit

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ninehole_client::config::parse_join_link;
use ninehole_client::{ClientConfig, CommandFailure, GameClient, SessionError, View};
use ninehole_protocol::{Cell, Game, Phase, Position};

/// How long the loop blocks on the event queue before checking stdin.
const TICK: Duration = Duration::from_millis(50);

fn main() {
    if std::env::args().skip(1).any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match ClientConfig::from_env_and_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            std::process::exit(1);
        }
    };

    println!("Connecting to {} ...", config.channel_url);
    let mut client = GameClient::start(config);
    let input = spawn_stdin_reader();
    let mut rendered = None;

    loop {
        client.wait(TICK);

        match input.try_recv() {
            Ok(line) => {
                if !run_command(&mut client, line.trim()) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        let revision = client.controller().revision();
        if rendered != Some(revision) {
            rendered = Some(revision);
            println!("{}", render(&client));
        }
    }

    client.shutdown();
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run one prompt command. Returns `false` to exit.
fn run_command(client: &mut GameClient, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return true;
    };
    let argument = words.next();

    let result: Result<(), SessionError> = match (command, argument) {
        ("quit" | "exit", _) => return false,
        ("help", _) => {
            print_commands();
            Ok(())
        }
        ("create", _) => client.controller_mut().create_lobby().map(drop),
        ("join", Some(raw)) => match parse_join_link(raw) {
            Ok(lobby_id) => client.controller_mut().join_lobby(lobby_id.as_str()).map(drop),
            Err(e) => {
                println!("{e}");
                Ok(())
            }
        },
        ("join", None) => {
            let link = client.controller().join_link().cloned();
            match link {
                Some(lobby_id) => client.controller_mut().join_lobby(lobby_id.as_str()).map(drop),
                None => Err(SessionError::EmptyLobbyId),
            }
        }
        ("leave", _) => client.controller_mut().leave_lobby().map(drop),
        ("click", Some(raw)) => click(client, raw),
        (raw, None) if raw.parse::<usize>().is_ok() => click(client, raw),
        _ => {
            println!("Unknown command `{line}`. Type `help` for commands.");
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("Cannot do that: {e}");
    }
    true
}

fn click(client: &mut GameClient, raw: &str) -> Result<(), SessionError> {
    match raw.parse::<usize>() {
        Ok(index) => client.controller_mut().click(index).map(drop),
        Err(_) => {
            println!("`{raw}` is not a board position (0-8).");
            Ok(())
        }
    }
}

fn render(client: &GameClient) -> String {
    match client.view() {
        View::Loading => "Loading...".into(),
        View::Disconnected { reason: None } => {
            "Connection to the server closed. Restart the client to play again.".into()
        }
        View::Disconnected {
            reason: Some(reason),
        } => format!(
            "There was an error with the connection to the server: {reason}\n\
             Restart the client to play again."
        ),
        View::MainMenu {
            controls_enabled,
            join_link,
            create_error,
            join_error,
        } => {
            let mut out = String::from("Main menu: `create` a lobby or `join <lobby id>`.");
            if let Some(lobby_id) = join_link {
                out += &format!("\nLobby from link: {lobby_id}");
            }
            if !controls_enabled {
                out += "\nWorking...";
            }
            push_error(&mut out, "Could not create lobby", create_error);
            push_error(&mut out, "Could not join lobby", join_error);
            out
        }
        View::Waiting {
            lobby_id,
            leaving,
            leave_error,
        } => {
            let mut out = format!("Waiting for opponent to join. Lobby ID is: {lobby_id}");
            if let Some(link) = client.share_link() {
                out += &format!("\nShare this link: {link}");
            }
            if leaving {
                out += "\nLeaving...";
            }
            push_error(&mut out, "Could not leave", leave_error);
            out
        }
        View::InGame {
            game,
            active_position,
            move_error,
            submitting,
            leaving,
            leave_error,
            ..
        } => {
            let mut out = match game.winner() {
                Some(winner) => format!("Game over: {winner} wins."),
                None => format!("This is the {} phase. It is {}'s turn.", phase_name(game.phase), game.turn),
            };
            out.push('\n');
            out += &draw_board(&game, active_position);
            push_error(&mut out, "Invalid move!", move_error);
            if submitting {
                out += "\nSubmitting move...";
            }
            if leaving {
                out += "\nLeaving...";
            }
            push_error(&mut out, "Could not leave", leave_error);
            out
        }
    }
}

fn push_error(out: &mut String, label: &str, error: Option<CommandFailure>) {
    if let Some(error) = error {
        out.push_str(&format!("\n{label} {error}"));
    }
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Setup => "SETUP",
        Phase::Playing => "PLAYING",
        Phase::GameOver => "GAME_OVER",
    }
}

/// Board rows as (indent, positions), top to bottom: ring 1-8 runs clockwise
/// from the top around the center 0.
const LAYOUT: [(usize, &[usize]); 5] = [
    (8, &[1]),
    (4, &[8, 2]),
    (0, &[7, 0, 3]),
    (4, &[6, 4]),
    (8, &[5]),
];

/// Spacing between cells on one row.
const GAP: &str = "     ";

/// Draw the board next to a legend of position numbers. The armed source
/// position is bracketed.
fn draw_board(game: &Game, active: Option<Position>) -> String {
    let mut lines = Vec::new();
    for (indent, positions) in LAYOUT {
        let mut cells = Vec::new();
        let mut legend = Vec::new();
        for &index in positions {
            let Some(position) = Position::new(index) else {
                continue;
            };
            let mark = match game.cell(position) {
                Cell::Player1 => 'X',
                Cell::Player2 => 'O',
                Cell::Empty => '.',
            };
            cells.push(if active == Some(position) {
                format!("[{mark}]")
            } else {
                format!(" {mark} ")
            });
            legend.push(format!(" {index} "));
        }

        let row = format!("{}{}", " ".repeat(indent), cells.join(GAP));
        let key = format!("{}{}", " ".repeat(indent), legend.join(GAP));
        lines.push(format!("{row:<24}{key}"));
    }
    lines.join("\n")
}

fn print_usage() {
    println!("Usage: ninehole [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --server <URL>        Authority base URL (default: $NINEHOLE_SERVER or http://localhost:8080)");
    println!("  --channel-url <URL>   Notification channel URL (default: derived from --server)");
    println!("  --join <LINK|ID>      Join this lobby once connected");
    println!("  --identity <ID>       Reuse an existing participant id");
    println!("  --help, -h            Show this help");
}

fn print_commands() {
    println!("create            create a lobby");
    println!("join <ID|LINK>    join a lobby");
    println!("<n> | click <n>   click board position n (0 = center, 1-8 clockwise from top)");
    println!("leave             leave the lobby");
    println!("quit              exit");
}
