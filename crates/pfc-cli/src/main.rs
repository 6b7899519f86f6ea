use anyhow::Result;
use clap::{Parser, Subcommand};
use pfc_schemas::Direction;
use rust_decimal::Decimal;
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(name = "pfc")]
#[command(about = "Prop-firm challenge engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Challenge lifecycle commands
    Challenge {
        /// Layered config paths in merge order (defaults when omitted)
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: ChallengeCmd,
    },

    /// Trade commands
    Trade {
        /// Layered config paths in merge order (defaults when omitted)
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: TradeCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations
    Migrate,
}

#[derive(Subcommand)]
enum ChallengeCmd {
    /// Create a challenge with the configured limits
    Create {
        /// Owner (user) id
        #[arg(long)]
        user: Uuid,

        /// Initial capital (configured starting balance when omitted)
        #[arg(long)]
        capital: Option<Decimal>,
    },

    /// Re-evaluate one challenge and commit any transition
    Evaluate { id: Uuid },

    /// Print trade statistics and distance to each limit
    Summary { id: Uuid },

    /// Reset daily P&L for one challenge, or all active challenges
    ResetDaily {
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Evaluate every active challenge once
    EvaluateAll,
}

#[derive(Subcommand)]
enum TradeCmd {
    /// Open a trade against an active challenge
    Open {
        #[arg(long)]
        challenge: Uuid,

        #[arg(long)]
        symbol: String,

        /// long | short
        #[arg(long, value_parser = parse_direction)]
        direction: Direction,

        #[arg(long)]
        entry_price: Decimal,

        /// Notional amount
        #[arg(long)]
        amount: Decimal,

        #[arg(long, default_value = "1")]
        leverage: Decimal,
    },

    /// Close a trade with an already-computed P&L, then evaluate
    Settle {
        trade_id: Uuid,

        #[arg(long)]
        exit_price: Decimal,

        #[arg(long, allow_hyphen_values = true)]
        pnl: Decimal,
    },

    /// Evaluate the challenge owning a closed trade
    Complete { trade_id: Uuid },
}

fn parse_direction(raw: &str) -> Result<Direction, String> {
    Direction::parse(&raw.trim().to_lowercase()).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = pfc_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = pfc_db::status(&pool).await?;
                    println!("db_ok={}", s.ok);
                    println!("schema_ready={}", s.schema_ready());
                    for t in &s.missing_tables {
                        println!("missing_table={t}");
                    }
                    if let (Some(active), Some(open)) = (s.active_challenges, s.open_trades) {
                        println!("active_challenges={active}");
                        println!("open_trades={open}");
                    }
                }
                DbCmd::Migrate => {
                    pfc_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = pfc_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Challenge { config_paths, cmd } => {
            let evaluator = commands::evaluator_from_env(&config_paths).await?;
            match cmd {
                ChallengeCmd::Create { user, capital } => {
                    commands::challenge::create(&evaluator, user, capital).await?
                }
                ChallengeCmd::Evaluate { id } => {
                    commands::challenge::evaluate(&evaluator, id).await?
                }
                ChallengeCmd::Summary { id } => commands::challenge::summary(&evaluator, id).await?,
                ChallengeCmd::ResetDaily { id } => {
                    commands::challenge::reset_daily(&evaluator, id).await?
                }
                ChallengeCmd::EvaluateAll => commands::challenge::evaluate_all(&evaluator).await?,
            }
        }

        Commands::Trade { config_paths, cmd } => {
            let evaluator = commands::evaluator_from_env(&config_paths).await?;
            match cmd {
                TradeCmd::Open {
                    challenge,
                    symbol,
                    direction,
                    entry_price,
                    amount,
                    leverage,
                } => {
                    commands::trade::open(
                        &evaluator,
                        commands::trade::OpenArgs {
                            challenge_id: challenge,
                            symbol,
                            direction,
                            entry_price,
                            amount,
                            leverage,
                        },
                    )
                    .await?
                }
                TradeCmd::Settle {
                    trade_id,
                    exit_price,
                    pnl,
                } => commands::trade::settle(&evaluator, trade_id, exit_price, pnl).await?,
                TradeCmd::Complete { trade_id } => {
                    commands::trade::complete(&evaluator, trade_id).await?
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries key=value output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
