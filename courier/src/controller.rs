use std::sync::Arc;

use chrono::Local;
use courier_common::internal;
use courier_dispatch::{
    BatchReport, CancellationToken, Dispatcher, MessageJob, ProbeReport, ProgressCallback,
    SmtpRelay,
};
use tokio::signal::unix::{SignalKind, signal};

use crate::config::{Config, JobSource};

/// Cancel `token` on the first Ctrl+C or SIGTERM. Jobs already talking to
/// the relay finish; the rest of the batch is reported as cancelled.
async fn cancel_on_shutdown(token: CancellationToken) -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = WARN, "CTRL+C entered, cancelling the batch");
        }
        _ = terminate.recv() => {
            internal!(level = WARN, "Terminate Signal received, cancelling the batch");
        }
        () = token.cancelled() => {
            return Ok(());
        }
    };

    token.cancel();
    Ok(())
}

/// Load the jobs and dispatch them through the configured relay.
///
/// # Errors
///
/// Fails if the jobs cannot be loaded or the batch is rejected before
/// anything is sent. Individual delivery failures are in the report.
#[tracing::instrument(level = "debug", skip_all, err)]
pub async fn send(config: Config, source: &JobSource) -> anyhow::Result<BatchReport> {
    let jobs = source.load(Local::now().naive_local())?;
    internal!(level = INFO, jobs = jobs.len(), "Loaded batch");

    let Config {
        relay,
        dispatch,
        history,
    } = config;
    let dispatcher = Dispatcher::new(Arc::new(SmtpRelay::new()), history.store(), dispatch);

    let progress: ProgressCallback = Arc::new(|completed: usize, total: usize| {
        internal!(level = DEBUG, completed, total, "Progress");
    });

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let result = dispatcher
        .dispatch_batch(jobs, relay, Some(progress), Some(cancel.clone()))
        .await;

    // Release the signal watcher if the batch ended on its own.
    cancel.cancel();
    match watcher.await {
        Ok(Err(e)) => tracing::warn!("Signal handling unavailable: {e}"),
        Err(e) => tracing::warn!("Signal watcher failed: {e}"),
        Ok(Ok(())) => {}
    }

    Ok(result?)
}

/// Render jobs without sending them.
///
/// # Errors
///
/// See [`JobSource::load`].
pub fn render(source: &JobSource) -> anyhow::Result<Vec<MessageJob>> {
    source.load(Local::now().naive_local())
}

/// Validate the configuration, then open a session with the relay and
/// authenticate, without sending anything.
///
/// # Errors
///
/// Fails on invalid dispatch options, an empty host or sender, or any
/// failure while talking to the relay.
#[tracing::instrument(level = "debug", skip_all, err)]
pub async fn check(config: &Config) -> anyhow::Result<ProbeReport> {
    config.dispatch.validate()?;
    if config.relay.host.trim().is_empty() {
        anyhow::bail!("relay host is empty");
    }
    if config.relay.from_address.trim().is_empty() {
        anyhow::bail!("relay from_address is empty");
    }

    internal!(
        level = INFO,
        host = %config.relay.host,
        port = config.relay.port,
        "Probing relay"
    );

    Ok(SmtpRelay::probe(&config.relay).await?)
}
