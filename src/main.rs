use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

use mailgram::auth::token_manager::TokenManager;
use mailgram::auth::token_store::{self, Secret};
use mailgram::config::{Config, TelegramConfig, load_config, resolve_db_path};
use mailgram::mail::imap_client::ImapMailSource;
use mailgram::monitor::{MonitorConfig, run_monitor};
use mailgram::notify::telegram::{Notifier, TelegramNotifier};
use mailgram::store::sqlite::SqliteStore;
use mailgram::summary::{SummaryConfig, send_summary};

#[derive(Parser)]
#[command(name = "mailgram")]
#[command(about = "Forward new Gmail messages to a Telegram chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the inbox and notify the chat about each new message
    Monitor {
        /// Poll interval in seconds
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Newest messages fetched per cycle
        #[arg(long, default_value_t = 25)]
        limit: u32,

        /// Days a notified id is remembered before eviction
        #[arg(long, default_value_t = 7)]
        retention_days: u32,
    },

    /// Send a one-shot digest of recent messages to the chat
    Summary {
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Send a test message to verify bot token and chat id
    TestTelegram,

    /// Store the OAuth client secret in the OS keyring
    SetClientSecret {
        #[arg(long)]
        client_id: String,
    },
}

fn build_source(cfg: &Config) -> Result<ImapMailSource> {
    let token_mgr = TokenManager::from_config(cfg)?;
    let imap_server = cfg
        .imap_server
        .clone()
        .unwrap_or_else(|| "imap.gmail.com".to_string());
    let user_email = cfg
        .user_email
        .clone()
        .ok_or_else(|| anyhow!("user_email not set in config"))?;
    Ok(ImapMailSource::new(imap_server, user_email, token_mgr))
}

fn build_notifier() -> Result<TelegramNotifier> {
    let tg = TelegramConfig::from_env()?;
    TelegramNotifier::new(&tg.bot_token, tg.chat_id)
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::SetClientSecret { client_id } => {
            eprintln!("Paste client secret (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            let secret = secret.trim();
            token_store::save(
                Secret::ClientSecret {
                    client_id: &client_id,
                },
                secret,
            )?;
            println!("Saved client secret for client_id {}", client_id);
            Ok(())
        }

        Command::TestTelegram => {
            let notifier = build_notifier()?;
            notifier
                .send("\u{2705} mailgram can reach this chat.")
                .map_err(|e| anyhow!("test message failed: {e}"))?;
            println!("Test message sent.");
            Ok(())
        }

        Command::Summary { limit } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let source = build_source(&cfg)?;
            let notifier = build_notifier()?;
            send_summary(
                &source,
                &notifier,
                &SummaryConfig {
                    limit,
                    ..SummaryConfig::default()
                },
            )
        }

        Command::Monitor {
            interval,
            limit,
            retention_days,
        } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let db_path = resolve_db_path(&cfg)?;
            let store = SqliteStore::open(&db_path)?;

            let source = build_source(&cfg)?;
            let notifier = build_notifier()?;

            let running = Arc::new(AtomicBool::new(true));
            let r2 = running.clone();
            ctrlc::set_handler(move || {
                r2.store(false, Ordering::SeqCst);
            })?;

            // A failed authentication propagates out of run_monitor and
            // exits the process non-zero.
            run_monitor(
                &source,
                &notifier,
                &store,
                &MonitorConfig {
                    interval_secs: interval,
                    fetch_limit: limit,
                    retention_secs: i64::from(retention_days) * 24 * 3600,
                    ..MonitorConfig::default()
                },
                &running,
            )
        }
    }
}
