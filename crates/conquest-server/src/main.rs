//! `conquest` command-line entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use conquest_core::config::GameSettings;
use conquest_core::enums::AiDifficulty;
use conquest_core::ids::{GameId, MapId};
use conquest_persistence::{db, init_db, GameRepository};
use conquest_server::{GameServer, LoopExit, ServerConfig};

#[derive(Parser)]
#[command(name = "conquest", version, about = "Authoritative RTS game-state server")]
struct Cli {
    /// YAML server config. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database if needed and apply migrations.
    Migrate,
    /// Play a computer-only match and persist it.
    Simulate {
        #[arg(long, default_value_t = 1)]
        map: u32,
        #[arg(long, default_value_t = 2)]
        players: u8,
        #[arg(long, default_value = "normal", value_parser = parse_difficulty)]
        difficulty: AiDifficulty,
        /// Abandon the match if undecided after this many ticks.
        #[arg(long, default_value_t = 18_000)]
        max_ticks: u64,
        /// Tick as fast as possible instead of in real time.
        #[arg(long)]
        unthrottled: bool,
    },
    /// List waiting and running games.
    Games {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print the stored state of a game as JSON.
    Show { game_id: u64 },
}

fn parse_difficulty(s: &str) -> Result<AiDifficulty, String> {
    AiDifficulty::parse(s).ok_or_else(|| format!("unknown difficulty {s:?} (easy, normal, hard)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Migrate => {
            let pool = init_db(&config.db).await.context("opening database")?;
            db::health_check(&pool).await?;
            db::shutdown(&pool).await;
            println!("database ready at {}", config.db.url);
        }
        Command::Simulate {
            map,
            players,
            difficulty,
            max_ticks,
            unthrottled,
        } => {
            if unthrottled {
                config.tick_rate_hz = 0;
            }
            simulate(&config, MapId(map), players, difficulty, max_ticks).await?;
        }
        Command::Games { limit } => {
            let pool = init_db(&config.db).await?;
            let repo = GameRepository::new(pool.clone());
            for game in repo.list_active_games(limit).await? {
                println!(
                    "{:>6}  {:<24} {:<12} {}/{} players  map {}  created {}",
                    game.id.0,
                    game.name,
                    game.status.as_str(),
                    game.current_players,
                    game.max_players,
                    game.map_id.0,
                    game.created_at.format("%Y-%m-%d %H:%M"),
                );
            }
            db::shutdown(&pool).await;
        }
        Command::Show { game_id } => {
            let pool = init_db(&config.db).await?;
            let repo = GameRepository::new(pool.clone());
            let Some(state) = repo.load_game_state(GameId(game_id)).await? else {
                bail!("game {game_id} not found");
            };
            let json = serde_json::json!({
                "game": state.game.record,
                "created_at": state.game.created_at,
                "players": state.players,
                "camps": state.camps,
                "units": state.units,
                "ships": state.ships,
                "region_control": state.region_control,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            db::shutdown(&pool).await;
        }
    }
    Ok(())
}

async fn simulate(
    config: &ServerConfig,
    map_id: MapId,
    players: u8,
    difficulty: AiDifficulty,
    max_ticks: u64,
) -> Result<()> {
    let pool = init_db(&config.db).await?;
    let repo = GameRepository::with_slow_query(pool.clone(), Duration::from_millis(config.db.slow_query_ms));
    let server = GameServer::new(
        repo,
        config.sync.clone(),
        config.load_maps()?,
        config.load_templates()?,
        config.sim.clone(),
        config.tick_duration(),
    );

    let settings = GameSettings {
        name: format!("AI skirmish on map {}", map_id.0),
        map_id,
        max_players: players,
        ..GameSettings::default()
    };
    let game = server.create_game(&settings, None).await?;
    for n in 1..=players {
        server.join_game(game, None, format!("Bot {n}"), Some(difficulty))?;
    }
    server.start_game(game)?;
    info!(%game, players, ?difficulty, "simulation started");

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let Some(snapshot) = server.get_snapshot(game)? else {
            continue;
        };
        if snapshot.game.status.is_terminal() || !server.running_games().contains(&game) {
            break;
        }
        if snapshot.time.tick >= max_ticks {
            info!(%game, tick = snapshot.time.tick, "tick limit reached");
            server.abandon_game(game)?;
            break;
        }
    }

    let exit = server.wait_for_end(game).await?;
    let final_state = server.repository().find_game(game).await?;
    match exit {
        LoopExit::Finished { winner } => println!("game {} finished, winner {winner:?}", game.0),
        other => println!("game {} ended: {other:?}", game.0),
    }
    if let Some(stored) = final_state {
        println!("stored status: {}", stored.record.status.as_str());
    }
    server.shutdown().await?;
    db::shutdown(&pool).await;
    Ok(())
}
