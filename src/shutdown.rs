//! OS signal handling.
//!
//! SIGHUP and SIGUSR1 request a reload; SIGINT and SIGTERM terminate. The
//! coordinator owns the process-wide cancellation token that the dispatcher,
//! its workers and any producers watch.

use std::io;
use std::ops::ControlFlow;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// What a received signal asks the process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Reload configuration; keep running.
    Reload,
    /// Stop accepting work and shut down.
    Terminate,
}

/// Turns OS signals into reload callbacks and a single shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        ShutdownCoordinator {
            token: CancellationToken::new(),
        }
    }

    /// The token cancelled on terminate.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Shuts down without waiting for a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Applies one signal. Returns `Break` once the token is cancelled.
    pub fn handle(&self, signal: Signal, on_reload: &mut impl FnMut()) -> ControlFlow<()> {
        match signal {
            Signal::Reload => {
                info!("Reload signal received");
                on_reload();
                ControlFlow::Continue(())
            }
            Signal::Terminate => {
                info!("Terminate signal received, shutting down");
                self.trigger();
                ControlFlow::Break(())
            }
        }
    }

    /// Listens for signals until terminate (or until [`trigger`] is called),
    /// calling `on_reload` for every reload signal in between.
    ///
    /// Fails only if a signal handler cannot be installed.
    ///
    /// [`trigger`]: ShutdownCoordinator::trigger
    #[cfg(unix)]
    pub async fn run(&self, mut on_reload: impl FnMut()) -> io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hup = signal(SignalKind::hangup())?;
        let mut usr1 = signal(SignalKind::user_defined1())?;
        let mut int = signal(SignalKind::interrupt())?;
        let mut term = signal(SignalKind::terminate())?;
        info!("Listening for signals");

        loop {
            let received = tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                _ = hup.recv() => Signal::Reload,
                _ = usr1.recv() => Signal::Reload,
                _ = int.recv() => Signal::Terminate,
                _ = term.recv() => Signal::Terminate,
            };
            if self.handle(received, &mut on_reload).is_break() {
                return Ok(());
            }
        }
    }

    /// Listens for Ctrl+C until it arrives or [`trigger`] is called.
    /// Reload signals do not exist on this platform.
    ///
    /// [`trigger`]: ShutdownCoordinator::trigger
    #[cfg(not(unix))]
    pub async fn run(&self, mut on_reload: impl FnMut()) -> io::Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => Ok(()),
            res = tokio::signal::ctrl_c() => {
                res?;
                let _ = self.handle(Signal::Terminate, &mut on_reload);
                Ok(())
            }
        }
    }
}
