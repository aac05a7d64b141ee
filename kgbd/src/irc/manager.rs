//! Registry of IRC sessions, one per configured network.
//!
//! The manager owns spawn/teardown, applies config reloads by diffing
//! (identity changes respawn the session after a settle delay, membership
//! changes reconcile in place), fans announcements into session queues and
//! exposes the summed backlog for admission control.

use crate::admins::AdminList;
use crate::config::Config;
use crate::irc::session::{
    self, ChannelSettings, OutboundMessage, SessionConfig, SessionControl, SessionHandle,
    SessionShared,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Delay before respawning a session whose identity changed, spacing out
/// reconnects against the same server.
const RESPAWN_DELAY: Duration = Duration::from_secs(3);

/// Bound on waiting for sessions to flush during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

struct SessionEntry {
    cfg: SessionConfig,
    handle: SessionHandle,
}

/// Cloneable handle to the session registry.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Pending PRIVMSG lines across every session.
    pub fn total_backlog(&self) -> usize {
        self.inner
            .lock()
            .expect("session registry poisoned")
            .values()
            .map(|e| e.handle.backlog.load(Ordering::Relaxed))
            .sum()
    }

    /// Enqueue one announcement onto a network's session.
    ///
    /// Returns `false` when the message was dropped (unknown network, queue
    /// full, or session gone); delivery is best-effort by design.
    pub fn dispatch(&self, network: &str, msg: OutboundMessage) -> bool {
        let registry = self.inner.lock().expect("session registry poisoned");
        let Some(entry) = registry.get(network) else {
            warn!(network = %network, "dropping message for unknown network");
            return false;
        };
        let lines = msg.lines.len();
        entry.handle.backlog.fetch_add(lines, Ordering::Relaxed);
        match entry.handle.tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                entry.handle.backlog.fetch_sub(lines, Ordering::Relaxed);
                warn!(network = %network, error = %e, "send queue full, dropping message");
                false
            }
        }
    }

    /// Bring the registry in line with a (re)loaded config.
    pub fn apply_config(&self, config: &Config) {
        let shared = shared_from_config(config);
        let mut registry = self.inner.lock().expect("session registry poisoned");

        // Networks that vanished from the config.
        let removed: Vec<String> = registry
            .keys()
            .filter(|name| !config.networks.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(entry) = registry.remove(&name) {
                info!(network = %name, "network removed from config");
                quit_entry(&entry, "KGB going to drink vodka");
            }
        }

        for (name, net) in &config.networks {
            let channels = channel_settings(config, name);
            let cfg = SessionConfig {
                network: name.clone(),
                irc: net.clone(),
                channels: channels.clone(),
            };

            let identity_changed = registry
                .get(name)
                .map(|entry| entry.cfg.irc.identity_changed(net));
            match identity_changed {
                None => {
                    info!(network = %name, server = %net.server, "starting session");
                    let handle = session::spawn(cfg.clone(), shared.clone(), config.queue_limit);
                    registry.insert(name.clone(), SessionEntry { cfg, handle });
                }
                Some(true) => {
                    info!(network = %name, "connection settings changed, respawning");
                    if let Some(entry) = registry.remove(name) {
                        quit_entry(&entry, "KGB going to drink vodka");
                    }
                    self.respawn_later(cfg, shared.clone(), config.queue_limit);
                }
                Some(false) => {
                    let entry = registry.get_mut(name).expect("just looked up");
                    entry.cfg.channels = channels.clone();
                    let ctl = SessionControl::Reconfigure {
                        channels,
                        shared: shared.clone(),
                    };
                    if entry.handle.ctl.try_send(ctl).is_err() {
                        warn!(network = %name, "session control queue full");
                    }
                }
            }
        }
    }

    fn respawn_later(&self, cfg: SessionConfig, shared: SessionShared, queue_limit: usize) {
        let manager = self.clone();
        tokio::spawn(async move {
            sleep(RESPAWN_DELAY).await;
            let mut registry = manager.inner.lock().expect("session registry poisoned");
            // A later reload may have removed or replaced the network.
            if registry.contains_key(&cfg.network) {
                debug!(network = %cfg.network, "respawn superseded");
                return;
            }
            info!(network = %cfg.network, "respawning session");
            let name = cfg.network.clone();
            let handle = session::spawn(cfg.clone(), shared, queue_limit);
            registry.insert(name, SessionEntry { cfg, handle });
        });
    }

    /// Ask every session to QUIT and wait (bounded) for them to finish.
    pub async fn shutdown(&self, reason: &str) {
        let entries: Vec<SessionEntry> = {
            let mut registry = self.inner.lock().expect("session registry poisoned");
            registry.drain().map(|(_, e)| e).collect()
        };
        for entry in &entries {
            quit_entry(entry, reason);
        }
        for entry in entries {
            if timeout(SHUTDOWN_TIMEOUT, entry.handle.task).await.is_err() {
                warn!(network = %entry.cfg.network, "session did not stop in time");
            }
        }
    }

    #[cfg(test)]
    pub fn insert_test_session(
        &self,
        network: &str,
        capacity: usize,
    ) -> (
        tokio::sync::mpsc::Receiver<OutboundMessage>,
        Arc<std::sync::atomic::AtomicUsize>,
    ) {
        use crate::config::NetworkConfig;
        use tokio::sync::mpsc;

        let (tx, rx) = mpsc::channel(capacity);
        let (ctl_tx, _ctl_rx) = mpsc::channel(1);
        let backlog = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cfg = SessionConfig {
            network: network.to_string(),
            irc: NetworkConfig {
                server: "irc.invalid".to_string(),
                port: 6667,
                nick: "KGB".to_string(),
                username: "kgb".to_string(),
                ircname: "KGB bot".to_string(),
                password: None,
                nickserv_password: None,
            },
            channels: Vec::new(),
        };
        let handle = SessionHandle {
            tx,
            ctl: ctl_tx,
            backlog: backlog.clone(),
            task: tokio::spawn(async {}),
        };
        self.inner
            .lock()
            .unwrap()
            .insert(network.to_string(), SessionEntry { cfg, handle });
        (rx, backlog)
    }
}

fn quit_entry(entry: &SessionEntry, reason: &str) {
    let ctl = SessionControl::Quit {
        reason: reason.to_string(),
    };
    if entry.handle.ctl.try_send(ctl).is_err() {
        // Control queue full or session already gone; abort instead.
        entry.handle.task.abort();
    }
}

/// Session settings derived from the global config section.
fn shared_from_config(config: &Config) -> SessionShared {
    let admins = match AdminList::new(&config.admins) {
        Ok(admins) => admins,
        Err(e) => {
            warn!(error = %e, "bad admin mask, admin commands disabled");
            AdminList::empty()
        }
    };
    SessionShared {
        admins,
        smart_answers: config.smart_answers.clone(),
    }
}

fn channel_settings(config: &Config, network: &str) -> Vec<ChannelSettings> {
    config
        .channels_on(network)
        .into_iter()
        .map(|c| ChannelSettings {
            name: c.name.clone(),
            smart_answers: c.smart_answers.clone(),
            smart_answers_polygen: c.smart_answers_polygen,
        })
        .collect()
}
