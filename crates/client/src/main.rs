//! walletsync-watch - headless balance watcher
//!
//! Signs in, keeps the balance synchronized and prints every change.
//! Commands on stdin: `currency <CODE>`, `balance`, `rates`, `ping`,
//! `logout`, `quit`.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use walletsync_client::format::format_with_symbol;
use walletsync_client::shared_channel::{SharedChannel, WatchedSharedChannel, DEFAULT_WATCH_INTERVAL};
use walletsync_client::storage::{FileStore, KeyValueStore, MemoryStore};
use walletsync_client::{
    ApiClient, AuthSession, Notification, SessionHandle, SyncConfig, SynchronizationContext,
};
use walletsync_shared::{BalanceResponse, CurrencyCode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("walletsync_client=debug")),
        )
        .init();

    let config = SyncConfig::from_env();
    let (storage, shared): (Arc<dyn KeyValueStore>, Option<Arc<dyn SharedChannel>>) =
        match FileStore::in_config_dir() {
            Some(store) => {
                let storage: Arc<dyn KeyValueStore> = Arc::new(store);
                // Other running clients on this account share the config dir.
                let shared = WatchedSharedChannel::spawn(storage.clone(), DEFAULT_WATCH_INTERVAL);
                (storage, Some(Arc::new(shared)))
            }
            None => (Arc::new(MemoryStore::new()), None),
        };

    let (session, profile) = sign_in(&config, storage.as_ref()).await?;
    let mut builder = SynchronizationContext::builder(config, session).with_storage(storage);
    if let Some(shared) = shared {
        builder = builder.with_shared_channel(shared);
    }
    if let Some(profile) = profile {
        builder = builder.with_profile(profile);
    }
    let ctx = builder.build();
    ctx.start();

    let mut snapshots = ctx.store().watch();
    tokio::spawn(async move {
        loop {
            {
                let snapshot = snapshots.borrow_and_update();
                let marker = if snapshot.is_changing { " (changing)" } else { "" };
                println!(
                    "balance: {} {}{}",
                    snapshot.state.currency.symbol(),
                    snapshot.formatted_balance,
                    marker
                );
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    });

    let mut notifications = ctx.store().notifications();
    tokio::spawn(async move {
        while let Ok(Notification::CurrencyChangeFailed { requested, message }) = notifications.recv().await {
            eprintln!("could not switch to {requested}: {message}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("currency"), Some(code)) => match code.parse::<CurrencyCode>() {
                Ok(target) => {
                    if let Err(e) = ctx.store().change_currency(target).await {
                        eprintln!("{e}");
                    }
                }
                Err(_) => eprintln!("unknown currency: {code}"),
            },
            (Some("balance"), _) => {
                let state = ctx.store().get_state();
                println!(
                    "{} ({:?}, {:?}, {})",
                    format_with_symbol(state.balance.as_str(), state.currency),
                    state.last_update_source,
                    ctx.transport().state(),
                    state.last_updated_at
                );
            }
            (Some("rates"), _) => {
                if let Err(e) = ctx.rates().refresh().await {
                    eprintln!("{}", e.user_message());
                }
                match ctx.rates().table().await {
                    Some(table) => {
                        let age = ctx.rates().age_minutes(chrono::Utc::now()).await.unwrap_or(0);
                        println!("base {} ({} min old)", table.base, age);
                        let mut rates: Vec<_> = table.rates.iter().collect();
                        rates.sort_by_key(|(code, _)| code.code());
                        for (code, rate) in rates {
                            println!("  {code}: {rate}");
                        }
                    }
                    None => println!("no exchange rates yet"),
                }
            }
            (Some("ping"), _) => match ctx.transport().handle() {
                Some(handle) => {
                    if let Err(e) = handle.ping() {
                        eprintln!("{e}");
                    }
                }
                None => eprintln!("push channel not running"),
            },
            (Some("logout"), _) => {
                ctx.logout();
                break;
            }
            (Some("quit" | "exit"), _) => break,
            (None, _) => {}
            (Some(other), _) => eprintln!("unknown command: {other}"),
        }
    }

    ctx.shutdown();
    Ok(())
}

/// `WALLETSYNC_USERNAME` logs in against the server; `WALLETSYNC_TOKEN`
/// uses an existing credential; otherwise a persisted session is reused.
async fn sign_in(
    config: &SyncConfig,
    storage: &dyn KeyValueStore,
) -> anyhow::Result<(SessionHandle, Option<BalanceResponse>)> {
    let session = SessionHandle::restore(storage);

    if let Ok(username) = std::env::var("WALLETSYNC_USERNAME") {
        let client = ApiClient::new()
            .with_timeout(config.request_timeout)
            .with_base_url(config.api_base_url.clone());
        let response = client
            .login(&username)
            .await
            .with_context(|| format!("login as {username} failed"))?;
        let profile = response.snapshot();
        session.login(
            AuthSession {
                username: response.username,
                token: Some(response.token),
            },
            storage,
        );
        return Ok((session, Some(profile)));
    }

    if let Ok(token) = std::env::var("WALLETSYNC_TOKEN") {
        let username = session.username().unwrap_or_else(|| "watcher".to_string());
        session.login(
            AuthSession {
                username,
                token: Some(token),
            },
            storage,
        );
        return Ok((session, None));
    }

    if !session.is_authenticated() {
        bail!("no session: set WALLETSYNC_USERNAME or WALLETSYNC_TOKEN");
    }
    Ok((session, None))
}
