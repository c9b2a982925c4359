//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Wait for the next signal of interest.
#[cfg(unix)]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| SignalEvent::Shutdown),
        _ = terminate.recv() => Ok(SignalEvent::Shutdown),
        _ = hangup.recv() => Ok(SignalEvent::Reload),
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await?;
    Ok(SignalEvent::Shutdown)
}
