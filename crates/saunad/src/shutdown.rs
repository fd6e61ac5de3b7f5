//! Shutdown signalling
//!
//! SIGINT or SIGTERM flips a watch channel every task selects on. Tasks
//! finish their current step and return; the daemon joins each with a
//! timeout.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM and return its name
pub async fn wait_for_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            Ok("SIGINT")
        }
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Join a task, giving up after `timeout`. Returns the task output if it
/// finished in time.
pub async fn join_with_timeout<T>(name: &str, handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(output)) => {
            info!("{} stopped", name);
            Some(output)
        }
        Ok(Err(e)) => {
            warn!("{} task failed: {}", name, e);
            None
        }
        Err(_) => {
            warn!("{} did not stop within {:?}", name, timeout);
            None
        }
    }
}
