//! # OS shutdown signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first termination request and
//! names the signal so the orchestrator can log what stopped the stack.
//!
//! - unix: `SIGINT`, `SIGTERM` (what `stackvisor stop-all` sends), `SIGQUIT`
//! - elsewhere: Ctrl-C

/// Waits for a termination signal and returns its name.
///
/// Each call installs its own listeners. Fails only if a listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
///
/// Each call installs its own listeners. Fails only if a listener cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
