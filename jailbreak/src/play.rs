//! Line-oriented play loop.
//!
//! Lines starting with `#` are commands; anything else is sent to the
//! current level's gatekeeper.

use jailbreak_core::{
    AttemptOutcome, Error, GameBackend, GameSession, KeyValueStore, LevelId, Route,
};
use std::io::{self, BufRead, Write};

const HELP: &[(&str, &str)] = &[
    ("#levels", "List levels and which are unlocked"),
    ("#enter <id>", "Switch to an unlocked level"),
    ("#unlock <password>", "Try a password on the current level"),
    ("#status", "Show the current level and session"),
    ("#help", "Show this help"),
    ("#quit", "Exit the game"),
];

pub fn print_tutorial() {
    println!("[TUTORIAL]");
    println!("  Every level is guarded by an AI gatekeeper that knows a password.");
    println!("  Talk it into revealing the password, then submit it with #unlock.");
    println!("  A correct password unlocks the next level. Unlocks are kept between runs.");
    println!();
}

fn print_help() {
    for (command, summary) in HELP {
        println!("  {command:<20} - {summary}");
    }
    println!("  (anything else is sent to the gatekeeper)");
}

fn print_levels<B: GameBackend, S: KeyValueStore>(game: &GameSession<B, S>) {
    println!("[LEVELS]");
    for entry in game.level_selector() {
        let marker = match (entry.current, entry.unlocked) {
            (true, _) => '>',
            (false, true) => ' ',
            (false, false) => '#',
        };
        let lock = if entry.unlocked { "" } else { " (locked)" };
        println!(
            "  {marker} {:<12} {:<24} {}{lock}",
            entry.id.as_str(),
            entry.name,
            entry.difficulty.name()
        );
    }
}

fn print_status<B: GameBackend, S: KeyValueStore>(game: &GameSession<B, S>) {
    println!("[STATUS]");
    match game.current_level() {
        Ok(level) => println!(
            "  Level: {} ({}, {})",
            level.name,
            level.id,
            level.difficulty.name()
        ),
        Err(e) => println!("  Level: unknown ({e})"),
    }
    println!(
        "  Unlocked: {}/{}",
        game.state().unlocked().len(),
        game.graph().len()
    );
    println!("  Session: {}", game.session_id());
}

fn print_outcome(outcome: &AttemptOutcome) {
    match outcome {
        AttemptOutcome::Denied { .. } => {
            println!("[DENIED] Access denied. The gatekeeper holds.");
        }
        AttemptOutcome::Advanced {
            from,
            to,
            route,
            unlocked,
        } => {
            println!("[UNLOCKED] {from} breached.");
            if !unlocked.is_empty() {
                let ids: Vec<&str> = unlocked.iter().map(LevelId::as_str).collect();
                println!("  New levels: {}", ids.join(", "));
            }
            if *route == Route::DifficultyFallback {
                println!("  Moving up a difficulty tier.");
            }
            println!("  Now entering {to}.");
        }
        AttemptOutcome::Completed { level } => {
            println!("[COMPLETE] {level} was the last level. Nothing left to break.");
        }
        AttemptOutcome::Stale { level } => {
            println!("[IGNORED] Verdict for {level} arrived after you moved on.");
        }
    }
}

/// Run the game until stdin closes or the player quits.
pub async fn run<B: GameBackend, S: KeyValueStore>(
    mut game: GameSession<B, S>,
) -> Result<(), Error> {
    println!("=== jAILBREAK ===");
    print_levels(&game);
    println!();
    println!("Type #help for commands.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let (name, rest) = command
                .split_once(char::is_whitespace)
                .map(|(name, rest)| (name, rest.trim()))
                .unwrap_or((command, ""));
            match name {
                "quit" | "exit" => {
                    println!("Connection closed.");
                    break;
                }
                "levels" => print_levels(&game),
                "status" => print_status(&game),
                "help" => {
                    println!("[HELP]");
                    print_help();
                }
                "enter" if !rest.is_empty() => {
                    match game.enter_level(&LevelId::new(rest)).await {
                        Ok(()) => println!("[ENTERED] {rest}. New conversation started."),
                        Err(e) => println!("[ERROR] {e}"),
                    }
                }
                "unlock" if !rest.is_empty() => match game.submit_password(rest).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) if e.is_recoverable() => println!("[ERROR] {e}. Try again."),
                    Err(e) => return Err(e),
                },
                "enter" => println!("[ERROR] Usage: #enter <id>"),
                "unlock" => println!("[ERROR] Usage: #unlock <password>"),
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            stdout.flush().ok();
            continue;
        }

        print!("[TRANSMITTING]");
        stdout.flush().ok();
        let reply = game.chat(line).await;
        print!("\r              \r");
        if reply.malfunction {
            println!("[MALFUNCTION]");
        } else {
            println!("[GATEKEEPER]");
        }
        for para in reply.text.split("\n\n") {
            println!("{para}");
        }
        println!();
        stdout.flush().ok();
    }

    Ok(())
}
