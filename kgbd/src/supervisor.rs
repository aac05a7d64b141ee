//! Signal handling, config reload and lifecycle control.
//!
//! `INT`/`TERM` shut down gracefully (a second one forces exit), `QUIT`
//! restarts by re-exec'ing the current image, and `HUP` reloads the config
//! file in place unless the RPC bind moved, which also takes the restart
//! path.

use crate::config::{self, Config};
use crate::irc::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Why the supervisor returned control to `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Plain shutdown; exit cleanly.
    Exit,
    /// Re-exec the current binary (QUIT signal or RPC bind change).
    Restart,
}

/// The QUIT message sent to every IRC session on the way out.
pub const GOODBYE: &str = "KGB going to drink vodka";

pub struct Supervisor {
    config_path: PathBuf,
    config_tx: watch::Sender<Arc<Config>>,
    manager: SessionManager,
    /// Flipped to stop the RPC accept loop.
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(
        config_path: PathBuf,
        config_tx: watch::Sender<Arc<Config>>,
        manager: SessionManager,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            config_path,
            config_tx,
            manager,
            shutdown_tx,
        }
    }

    /// Run until a signal decides the process's fate.
    pub async fn run(self) -> anyhow::Result<Outcome> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let outcome = loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT: shutting down");
                    break Outcome::Exit;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM: shutting down");
                    break Outcome::Exit;
                }
                _ = sigquit.recv() => {
                    info!("SIGQUIT: restarting");
                    break Outcome::Restart;
                }
                _ = sighup.recv() => {
                    if self.reload() {
                        info!("RPC bind changed: restarting");
                        break Outcome::Restart;
                    }
                }
            }
        };

        // Stop accepting RPC, say goodbye on IRC, let sends settle. A
        // second INT/TERM while this runs forces an immediate exit.
        let _ = self.shutdown_tx.send(true);
        let shutdown = self.manager.shutdown(GOODBYE);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sigint.recv() => {
                    warn!("second signal: forcing exit");
                    std::process::exit(1);
                }
                _ = sigterm.recv() => {
                    warn!("second signal: forcing exit");
                    std::process::exit(1);
                }
            }
        }

        Ok(outcome)
    }

    /// Re-read the config file. Returns `true` when the RPC bind changed
    /// and the daemon must restart to pick it up.
    fn reload(&self) -> bool {
        let new_config = match config::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                // Keep serving with the old config; a bad file on reload
                // must never take the daemon down.
                error!(error = %e, "config reload failed, keeping old config");
                return false;
            }
        };

        let old = self.config_tx.borrow().clone();
        if old.rpc_bind_changed(&new_config) {
            return true;
        }

        info!(path = %self.config_path.display(), "config reloaded");
        let new_config = Arc::new(new_config);
        let _ = self.config_tx.send(new_config.clone());
        self.manager.apply_config(&new_config);
        false
    }
}

/// Replace the current process image, preserving the config path.
///
/// Only returns on failure.
pub fn exec_restart(config_path: &std::path::Path) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    info!(exe = %exe.display(), "replacing process image");
    std::process::Command::new(exe)
        .arg("--foreground")
        .arg("--config")
        .arg(config_path)
        .exec()
}
