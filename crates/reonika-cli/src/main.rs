//! # reonika
//!
//! Terminal front end for the REonika state manager.
//!
//! Opens the local store, registers the local profile, passes the session
//! gate and then prints every view event as one JSON line on stdout. Line
//! commands on stdin drive navigation (`find`, `chat`, `open`, `send`,
//! `close`, `delete`, `leave`, `refresh`, `online`, `quit`).

mod commands;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use reonika_client::{check_session, Client, ClientConfig, LocalBackend, ViewEvent};
use reonika_shared::constants::APP_NAME;
use reonika_shared::{ChatId, Profile, ReonikaError, SystemClock, UserId};
use reonika_store::Database;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::commands::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    reonika_client::init_tracing();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and register the local profile
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => Database::open_at(path)
            .with_context(|| format!("opening database at {}", path.display()))?,
        None => Database::new().context("opening default database")?,
    };

    let me = config.user_id.unwrap_or_default();
    db.upsert_profile(
        &Profile {
            id: me,
            display_name: config.display_name.clone(),
            avatar_url: None,
        },
        Utc::now(),
    )
    .context("registering local profile")?;
    info!(user = %me, name = %config.display_name, "Local profile ready");

    let backend = Arc::new(LocalBackend::new(db, Arc::new(SystemClock)));

    // -----------------------------------------------------------------------
    // 4. Session gate
    // -----------------------------------------------------------------------
    if !check_session(backend.as_ref(), me, config.session_timeout)
        .await
        .is_valid()
    {
        anyhow::bail!("no valid session for {me}");
    }

    // -----------------------------------------------------------------------
    // 5. Start the client and pump events until shutdown
    // -----------------------------------------------------------------------
    let (client, mut events) =
        Client::start(backend.clone(), me, &config, Arc::new(SystemClock)).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut open_chat: Option<ChatId> = None;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if !run_command(&client, &backend, &line, &mut open_chat).await {
                            break;
                        }
                    }
                    // Keep printing until Ctrl+C.
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed, ignoring further input");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

fn find_profiles(backend: &LocalBackend, me: UserId, query: &str) -> reonika_shared::Result<()> {
    let db = backend.database();
    let guard = db
        .lock()
        .map_err(|e| ReonikaError::NetworkFailure(format!("Lock poisoned: {e}")))?;
    for profile in guard.search_profiles(query, me, 20)? {
        eprintln!("{}  {}", profile.id, profile.display_name);
    }
    Ok(())
}

fn print_event(event: &ViewEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(event = event.name(), error = %e, "could not encode event"),
    }
}

/// Execute one stdin command. Returns `false` when the user asked to quit.
async fn run_command(
    client: &Client,
    backend: &LocalBackend,
    line: &str,
    open_chat: &mut Option<ChatId>,
) -> bool {
    let command = match commands::parse(line) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            return true;
        }
    };

    let result = match command {
        Command::Quit => return false,
        Command::Chat(other) => client.start_conversation(other).await.map(|chat| {
            *open_chat = Some(chat.id);
            eprintln!("chat {}", chat.id);
        }),
        Command::Open(chat_id) => {
            *open_chat = Some(chat_id);
            client.open_chat(chat_id).await
        }
        Command::Close => {
            *open_chat = None;
            client.close_chat().await
        }
        Command::Send(text) => match *open_chat {
            Some(chat_id) => client.send_text(chat_id, &text).await.map(|_| ()),
            None => {
                eprintln!("no chat open");
                Ok(())
            }
        },
        Command::Delete(message_id) => client.delete_message(message_id).await,
        Command::Leave(chat_id) => {
            if *open_chat == Some(chat_id) {
                *open_chat = None;
            }
            client.delete_conversation(chat_id).await
        }
        Command::Find(query) => find_profiles(backend, client.me(), &query),
        Command::Refresh => client.refresh().await,
        Command::Online => {
            let online: Vec<String> = client
                .online_users()
                .iter()
                .filter(|id| **id != client.me())
                .map(UserId::to_string)
                .collect();
            eprintln!("online: {}", online.join(", "));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
    }
    true
}
