// src/main.rs

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use drill_trainer::models::{CompleteRequest, Drill, Outcome, SessionOutcome};
use drill_trainer::{database, service, RngSource, TrainerConfig};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drill-trainer", version, about = "Adaptive drill assignment and progression")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "drill_trainer.db")]
    db: PathBuf,

    /// JSON file overriding the tuning defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for exploration draws
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema and seed the drill catalog
    Init {
        /// JSON array of drills to load instead of the built-in catalog
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Preview the next drill without opening a session
    Assign {
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: String,
    },
    /// Assign a drill and open a session
    Start {
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: String,
    },
    /// Record the outcome of a session
    Complete {
        #[arg(long)]
        session: String,
        #[arg(long)]
        drill: String,
        #[arg(long)]
        outcome: Outcome,
        #[arg(long)]
        minutes: f64,
        #[arg(long, default_value_t = 0)]
        xp: u32,
        /// Session was abandoned before the end
        #[arg(long)]
        incomplete: bool,
        #[arg(long)]
        confidence_after: Option<f64>,
        /// Spend a freeze token (manual freeze policy)
        #[arg(long)]
        use_freeze: bool,
    },
    /// Show XP, streak, confidence and badges
    Status {
        #[arg(long)]
        user: String,
    },
    /// Add streak freeze tokens
    GrantFreeze {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = TrainerConfig::load_or_default(cli.config.as_deref())?;

    info!("Starting Drill Trainer...");
    info!("Database path: {:?}", cli.db);
    let conn = Connection::open(&cli.db)
        .with_context(|| format!("failed to open database {:?}", cli.db))?;

    let mut rng = RngSource(match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    });
    let now = Utc::now();

    match cli.command {
        Command::Init { catalog } => match catalog {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read catalog {:?}", path))?;
                let drills: Vec<Drill> = serde_json::from_str(&raw)
                    .with_context(|| format!("invalid catalog {:?}", path))?;
                database::init_db_with_catalog(&conn, &drills)?;
                print_json(&serde_json::json!({ "loaded": drills.len() }))
            }
            None => {
                database::init_db(&conn)?;
                print_json(&serde_json::json!({ "initialized": true }))
            }
        },
        Command::Assign { user, category } => {
            database::init_db(&conn)?;
            let result = service::assign_next(&conn, &user, &category, &config, now, &mut rng)?;
            print_json(&result)
        }
        Command::Start { user, category } => {
            database::init_db(&conn)?;
            let started = service::start_session(&conn, &user, &category, &config, now, &mut rng)?;
            print_json(&started)
        }
        Command::Complete {
            session,
            drill,
            outcome,
            minutes,
            xp,
            incomplete,
            confidence_after,
            use_freeze,
        } => {
            database::init_db(&conn)?;
            let request = CompleteRequest {
                session_id: session,
                outcome: SessionOutcome {
                    duration_minutes: minutes,
                    xp_earned: xp,
                    completed: !incomplete,
                    drill_id: drill,
                    drill_outcome: outcome,
                    confidence_after,
                    use_freeze,
                },
            };
            debug!("Complete request: {:?}", request);
            let update = service::complete_session(&conn, &request, &config, now)?;
            print_json(&update)
        }
        Command::Status { user } => {
            database::init_db(&conn)?;
            print_json(&service::user_status(&conn, &user)?)
        }
        Command::GrantFreeze { user, count } => {
            database::init_db(&conn)?;
            print_json(&service::grant_freeze_tokens(&conn, &user, count)?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
