//! jAILBREAK terminal client.
//!
//! Talk each level's gatekeeper out of its password, then unlock the next
//! level. Progress is kept in a local JSON file.
//!
//! ```bash
//! cargo run -p jailbreak -- --player alice1234
//! cargo run -p jailbreak -- --demo
//! ```

mod play;

use jailbreak_core::{
    FileStore, GameBackend, GameConfig, GameSession, KeyValueStore, MockAuthority, PlayerPrefs,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE: &str = "jailbreak_progress.json";

/// Options read from the command line.
#[derive(Debug, Default)]
struct CliConfig {
    player: Option<String>,
    store: Option<String>,
    level: Option<String>,
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let cli = parse_config_from_args(&args);

    let store = Arc::new(FileStore::new(cli.store.as_deref().unwrap_or(DEFAULT_STORE)));
    debug!(path = %store.path().display(), demo = cli.demo, "progress store");
    let prefs = PlayerPrefs::new(store.clone());

    let player = match cli.player.clone() {
        Some(name) => name,
        None => {
            let stored = prefs.username().await;
            if stored.is_empty() {
                prompt_username()?
            } else {
                stored
            }
        }
    };
    prefs.set_username(&player).await;

    if !prefs.tutorial_seen().await {
        play::print_tutorial();
        prefs.mark_tutorial_seen().await;
    }

    let mut config = GameConfig::new(player.trim()).with_username(player.trim());
    if let Some(level) = cli.level {
        config = config.with_start_level(level);
    }

    if cli.demo {
        return start(MockAuthority::sample(), store, config).await;
    }

    let client = match jailbreak_api::Client::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Set it in a .env file or run with --demo to play offline.");
            std::process::exit(1);
        }
    };
    start(client, store, config).await
}

async fn start<B: GameBackend, S: KeyValueStore>(
    backend: B,
    store: S,
    config: GameConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let game = match GameSession::start(backend, store, config).await {
        Ok(game) => game,
        Err(e) => {
            eprintln!("Failed to start game: {e}");
            std::process::exit(1);
        }
    };
    play::run(game).await?;
    Ok(())
}

/// Ask for a username until a non-empty one is entered.
fn prompt_username() -> io::Result<String> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("Enter your username: ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no username entered",
            ));
        }
        let name = line.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }
}

/// Parse client options from command line arguments.
fn parse_config_from_args(args: &[String]) -> CliConfig {
    let mut config = CliConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--player" => {
                if let Some(player) = args.get(i + 1) {
                    config.player = Some(player.clone());
                    i += 1;
                }
            }
            "--store" => {
                if let Some(path) = args.get(i + 1) {
                    config.store = Some(path.clone());
                    i += 1;
                }
            }
            "--level" => {
                if let Some(level) = args.get(i + 1) {
                    config.level = Some(level.clone());
                    i += 1;
                }
            }
            "--demo" => config.demo = true,
            _ => {}
        }
        i += 1;
    }

    config
}

fn print_help() {
    println!("jAILBREAK - talk your way past AI gatekeepers");
    println!();
    println!("USAGE:");
    println!("  jailbreak [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help          Show this help message");
    println!("  --player <NAME>     Player name (default: stored name, or prompt)");
    println!("  --store <PATH>      Progress file (default: {DEFAULT_STORE})");
    println!("  --level <ID>        Resume on this level if it is unlocked");
    println!("  --demo              Play against built-in sample levels, no backend");
    println!();
    println!("ENVIRONMENT:");
    println!("  JAILBREAK_API_URL     Backend origin (required unless --demo)");
    println!("  JAILBREAK_AUTH_TOKEN  Authorization header value (optional)");
    println!("  RUST_LOG              Log filter, logs go to stderr (default: warn)");
    println!();
    println!("EXAMPLES:");
    println!("  jailbreak --player alice1234");
    println!("  jailbreak --demo --store /tmp/demo.json");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_all_options() {
        let cli = parse_config_from_args(&args(&[
            "jailbreak", "--player", "alice", "--store", "p.json", "--level", "level2", "--demo",
        ]));
        assert_eq!(cli.player.as_deref(), Some("alice"));
        assert_eq!(cli.store.as_deref(), Some("p.json"));
        assert_eq!(cli.level.as_deref(), Some("level2"));
        assert!(cli.demo);
    }

    #[test]
    fn test_missing_values_are_ignored() {
        let cli = parse_config_from_args(&args(&["jailbreak", "--player"]));
        assert!(cli.player.is_none());
        assert!(!cli.demo);
    }
}
