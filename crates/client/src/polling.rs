//! HTTP balance polling while the push channel is down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use walletsync_shared::BalanceResponse;

use crate::api_client::WalletApi;
use crate::ws::ConnectionState;

/// Background poller. Fetches immediately whenever the observed state leaves
/// `Connected`, then every interval, and goes quiet the moment `Connected`
/// is observed again. Dropping it stops the task.
pub struct PollingFallback {
    task: JoinHandle<()>,
}

impl PollingFallback {
    pub fn spawn(
        api: Arc<dyn WalletApi>,
        state: watch::Receiver<ConnectionState>,
        interval: Duration,
        apply: impl Fn(BalanceResponse) + Send + Sync + 'static,
    ) -> Self {
        let task = tokio::spawn(run(api, state, interval, apply));
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    api: Arc<dyn WalletApi>,
    mut state: watch::Receiver<ConnectionState>,
    interval: Duration,
    apply: impl Fn(BalanceResponse),
) {
    loop {
        while state.borrow_and_update().is_connected() {
            if state.changed().await.is_err() {
                return;
            }
        }

        debug!(interval_secs = interval.as_secs(), "push channel down; polling balance");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reconnected = tokio::select! {
                        result = tokio::time::timeout(interval, api.fetch_balance()) => {
                            match result {
                                Ok(Ok(response)) => apply(response),
                                Ok(Err(e)) => warn!(error = %e, "balance poll failed; retrying next tick"),
                                Err(_) => warn!("balance poll outlived the interval; retrying"),
                            }
                            false
                        }
                        _ = wait_connected(&mut state) => true,
                    };
                    if reconnected {
                        debug!("push channel back; abandoning in-flight poll");
                        break;
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if state.borrow().is_connected() {
                        break;
                    }
                }
            }
        }
        debug!("push channel connected; polling paused");
    }
}

async fn wait_connected(state: &mut watch::Receiver<ConnectionState>) {
    loop {
        if state.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if state.borrow().is_connected() {
            return;
        }
    }
}
