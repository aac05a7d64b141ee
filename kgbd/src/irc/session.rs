//! One IRC session per configured network.
//!
//! A session is a long-running task owning its TCP connection: it
//! (re)connects with bounded backoff, registers, reclaims its nick, joins
//! its channels, answers CTCP and bot commands, and drains a bounded queue
//! of outbound announcements with per-channel de-duplication.

use crate::admins::AdminList;
use crate::config::NetworkConfig;
use crate::dedup::SessionDedup;
use crate::irc::message::{self, Message, parse_ctcp};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Cap for the reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How long in-flight writes may settle during shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

const CTCP_USERINFO: &str = "the KGB commit notification bot";
const CTCP_CLIENTINFO: &str = "VERSION USERINFO CLIENTINFO SOURCE";
const CTCP_SOURCE: &str = "https://github.com/kgb-irc/kgb-rs";

fn ctcp_version() -> String {
    format!("KGB {}", env!("CARGO_PKG_VERSION"))
}

/// Per-channel settings a session carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub name: String,
    /// Channel-scoped smart answers, overriding the global list.
    pub smart_answers: Option<Vec<String>>,
    /// Accepted for config compatibility; no oracle ships, so the random
    /// pick is always used.
    pub smart_answers_polygen: bool,
}

/// Connection identity and membership for one network.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub network: String,
    pub irc: NetworkConfig,
    pub channels: Vec<ChannelSettings>,
}

/// Behavioural settings shared by all sessions, swapped on reload.
#[derive(Debug, Clone)]
pub struct SessionShared {
    pub admins: AdminList,
    pub smart_answers: Vec<String>,
}

/// A whole formatted announcement for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: String,
    pub lines: Vec<String>,
}

/// Control messages from the supervisor side.
#[derive(Debug, Clone)]
pub enum SessionControl {
    Reconfigure {
        channels: Vec<ChannelSettings>,
        shared: SessionShared,
    },
    Quit {
        reason: String,
    },
}

/// Session lifecycle, mirrored in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connecting,
    Registered,
    Joined,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Registered => write!(f, "registered"),
            Self::Joined => write!(f, "joined"),
        }
    }
}

enum Exit {
    Shutdown,
    Disconnected,
}

/// Exponential reconnect backoff, capped at [`MAX_BACKOFF`].
#[derive(Debug)]
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }

    fn next(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(MAX_BACKOFF);
        current
    }

    fn reset(&mut self) {
        self.delay = Duration::from_secs(1);
    }
}

/// Handle held by the manager for one running session.
pub struct SessionHandle {
    pub tx: mpsc::Sender<OutboundMessage>,
    pub ctl: mpsc::Sender<SessionControl>,
    /// Pending PRIVMSG lines, summed across sessions for admission control.
    pub backlog: Arc<AtomicUsize>,
    pub task: JoinHandle<()>,
}

/// Spawn a session task. `queue_limit` bounds the outbound message queue.
pub fn spawn(cfg: SessionConfig, shared: SessionShared, queue_limit: usize) -> SessionHandle {
    let (tx, rx) = mpsc::channel(queue_limit.max(1));
    let (ctl_tx, ctl_rx) = mpsc::channel(8);
    let backlog = Arc::new(AtomicUsize::new(0));

    let session = Session {
        cfg,
        shared,
        rx,
        ctl: ctl_rx,
        backlog: backlog.clone(),
        state: SessionState::Disconnected,
        current_nick: String::new(),
        joined: HashSet::new(),
        dedup: SessionDedup::new(),
        backoff: Backoff::new(),
    };
    let task = tokio::spawn(session.run());

    SessionHandle {
        tx,
        ctl: ctl_tx,
        backlog,
        task,
    }
}

struct Session {
    cfg: SessionConfig,
    shared: SessionShared,
    rx: mpsc::Receiver<OutboundMessage>,
    ctl: mpsc::Receiver<SessionControl>,
    backlog: Arc<AtomicUsize>,
    state: SessionState,
    current_nick: String,
    joined: HashSet<String>,
    dedup: SessionDedup,
    backoff: Backoff,
}

impl Session {
    async fn run(mut self) {
        loop {
            match self.connect_and_drive().await {
                Ok(Exit::Shutdown) => {
                    info!(network = %self.cfg.network, "session shut down");
                    return;
                }
                Ok(Exit::Disconnected) => {
                    warn!(network = %self.cfg.network, "server closed the connection");
                }
                Err(e) => {
                    warn!(network = %self.cfg.network, error = %e, "session error");
                }
            }
            self.state = SessionState::Disconnected;
            if self.wait_before_reconnect().await {
                return;
            }
        }
    }

    /// Sleep out the backoff, still honouring control traffic.
    /// Returns `true` when the session should stop.
    async fn wait_before_reconnect(&mut self) -> bool {
        let delay = self.backoff.next();
        debug!(
            network = %self.cfg.network,
            state = %self.state,
            delay_secs = delay.as_secs(),
            "reconnect scheduled"
        );
        let sleeper = sleep(delay);
        tokio::pin!(sleeper);
        loop {
            tokio::select! {
                _ = &mut sleeper => return false,
                ctl = self.ctl.recv() => match ctl {
                    Some(SessionControl::Reconfigure { channels, shared }) => {
                        self.cfg.channels = channels;
                        self.shared = shared;
                    }
                    Some(SessionControl::Quit { .. }) | None => return true,
                },
            }
        }
    }

    async fn connect_and_drive(&mut self) -> anyhow::Result<Exit> {
        self.state = SessionState::Connecting;
        info!(
            network = %self.cfg.network,
            server = %self.cfg.irc.server,
            port = self.cfg.irc.port,
            "connecting"
        );
        let stream =
            TcpStream::connect((self.cfg.irc.server.as_str(), self.cfg.irc.port)).await?;
        let (read_half, mut writer) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // Fresh per connection: duplicate state never outlives its link.
        self.dedup = SessionDedup::new();
        self.joined.clear();
        self.current_nick = self.cfg.irc.nick.clone();

        if let Some(pw) = &self.cfg.irc.password {
            send_line(&mut writer, &message::pass(pw)).await?;
        }
        send_line(&mut writer, &message::nick(&self.current_nick)).await?;
        send_line(
            &mut writer,
            &message::user(&self.cfg.irc.username, &self.cfg.irc.ircname),
        )
        .await?;

        loop {
            let deliverable = self.can_deliver();
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => self.handle_line(&mut writer, &line).await?,
                    None => return Ok(Exit::Disconnected),
                },
                msg = self.rx.recv(), if deliverable => {
                    let Some(msg) = msg else { return Ok(Exit::Shutdown) };
                    self.deliver(&mut writer, msg).await?;
                },
                ctl = self.ctl.recv() => match ctl {
                    Some(SessionControl::Reconfigure { channels, shared }) => {
                        self.reconcile(&mut writer, channels, shared).await?;
                    }
                    Some(SessionControl::Quit { reason }) => {
                        let _ = send_line(&mut writer, &message::quit(&reason)).await;
                        let _ = timeout(FLUSH_TIMEOUT, writer.shutdown()).await;
                        return Ok(Exit::Shutdown);
                    }
                    None => return Ok(Exit::Shutdown),
                },
            }
        }
    }

    fn can_deliver(&self) -> bool {
        matches!(self.state, SessionState::Registered | SessionState::Joined)
    }

    async fn handle_line(&mut self, writer: &mut OwnedWriteHalf, line: &str) -> anyhow::Result<()> {
        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(network = %self.cfg.network, error = %e, "unparseable line");
                return Ok(());
            }
        };

        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.first().map(String::as_str).unwrap_or("");
                send_line(writer, &message::pong(token)).await?;
            }
            // Welcome: registration is complete.
            "001" => {
                self.state = SessionState::Registered;
                self.backoff.reset();
                info!(network = %self.cfg.network, nick = %self.current_nick, "registered");
                if let Some(pw) = &self.cfg.irc.nickserv_password {
                    send_line(
                        writer,
                        &message::privmsg("NickServ", &format!("IDENTIFY {pw}")),
                    )
                    .await?;
                }
                for channel in &self.cfg.channels {
                    send_line(writer, &message::join(&channel.name)).await?;
                }
            }
            // Nick already taken: fall back to a transient one.
            "433" => {
                if self.current_nick == self.cfg.irc.nick {
                    let transient = transient_nick(&self.cfg.irc.nick);
                    info!(network = %self.cfg.network, nick = %transient, "desired nick in use");
                    self.current_nick = transient.clone();
                    send_line(writer, &message::nick(&transient)).await?;
                }
            }
            "JOIN" => {
                if msg.source_nick() == Some(self.current_nick.as_str()) {
                    if let Some(channel) = msg.params.first() {
                        debug!(network = %self.cfg.network, channel = %channel, "joined");
                        self.joined.insert(channel.clone());
                        self.state = SessionState::Joined;
                    }
                }
            }
            // The desired nick just freed up: reclaim it.
            "QUIT" => {
                if self.wants_reclaim() && msg.source_nick() == Some(self.cfg.irc.nick.as_str()) {
                    send_line(writer, &message::nick(&self.cfg.irc.nick)).await?;
                }
            }
            "NICK" => {
                let new_nick = msg.params.first().map(String::as_str).unwrap_or("");
                if msg.source_nick() == Some(self.current_nick.as_str()) {
                    self.current_nick = new_nick.to_string();
                } else if self.wants_reclaim()
                    && msg.source_nick() == Some(self.cfg.irc.nick.as_str())
                {
                    send_line(writer, &message::nick(&self.cfg.irc.nick)).await?;
                }
            }
            "PRIVMSG" => self.handle_privmsg(writer, &msg).await?,
            _ => {}
        }
        Ok(())
    }

    fn wants_reclaim(&self) -> bool {
        self.current_nick != self.cfg.irc.nick
    }

    async fn handle_privmsg(
        &mut self,
        writer: &mut OwnedWriteHalf,
        msg: &Message,
    ) -> anyhow::Result<()> {
        let (Some(target), Some(text)) = (msg.params.first(), msg.params.get(1)) else {
            return Ok(());
        };
        let Some(sender) = msg.source_nick().map(str::to_string) else {
            return Ok(());
        };

        if let Some((tag, _)) = parse_ctcp(text) {
            let reply = match tag {
                "VERSION" => Some(ctcp_version()),
                "USERINFO" => Some(CTCP_USERINFO.to_string()),
                "CLIENTINFO" => Some(CTCP_CLIENTINFO.to_string()),
                "SOURCE" => Some(CTCP_SOURCE.to_string()),
                _ => None,
            };
            if let Some(reply) = reply {
                send_line(writer, &message::ctcp_reply(&sender, tag, &reply)).await?;
            }
            return Ok(());
        }

        if target.eq_ignore_ascii_case(&self.current_nick) {
            self.handle_address(writer, &sender, msg.source_mask(), text, None)
                .await
        } else {
            // Channel traffic from anyone feeds the echo-suppression window.
            self.dedup.observe(target, text);
            if let Some(rest) = addressed(text, &self.current_nick) {
                let rest = rest.to_string();
                self.handle_address(writer, &sender, msg.source_mask(), &rest, Some(target))
                    .await
            } else {
                Ok(())
            }
        }
    }

    /// React to a message addressed to the bot, on-channel or in private.
    async fn handle_address(
        &self,
        writer: &mut OwnedWriteHalf,
        sender: &str,
        mask: Option<&str>,
        body: &str,
        channel: Option<&str>,
    ) -> anyhow::Result<()> {
        let reply_to = channel.unwrap_or(sender);
        let body = body.trim();

        if body.starts_with('!') {
            let is_admin = mask.is_some_and(|m| self.shared.admins.matches(m));
            if !is_admin {
                debug!(sender = %sender, "ignoring command from non-admin");
                return Ok(());
            }
            let reply = command_reply(body, &self.current_nick);
            send_line(writer, &message::privmsg(reply_to, &reply)).await?;
        } else if !body.is_empty() {
            if let Some(answer) = self.smart_answer(channel) {
                send_line(writer, &message::privmsg(reply_to, &answer)).await?;
            }
        }
        Ok(())
    }

    /// Channel-scoped smart answers win over the global list.
    fn smart_answer(&self, channel: Option<&str>) -> Option<String> {
        let settings = channel.and_then(|name| self.cfg.channels.iter().find(|c| c.name == name));
        if settings.is_some_and(|c| c.smart_answers_polygen) {
            debug!(channel = ?channel, "no polygen oracle available, using canned answers");
        }
        let pool = settings
            .and_then(|c| c.smart_answers.as_ref())
            .unwrap_or(&self.shared.smart_answers);
        pool.choose(&mut rand::thread_rng()).cloned()
    }

    async fn deliver(
        &mut self,
        writer: &mut OwnedWriteHalf,
        msg: OutboundMessage,
    ) -> anyhow::Result<()> {
        self.backlog.fetch_sub(msg.lines.len(), Ordering::Relaxed);
        let Some(first) = msg.lines.first() else {
            return Ok(());
        };
        if !self.dedup.admit(&msg.channel, first) {
            debug!(network = %self.cfg.network, channel = %msg.channel, "duplicate dropped");
            return Ok(());
        }
        for line in &msg.lines {
            send_line(writer, &message::privmsg(&msg.channel, line)).await?;
        }
        Ok(())
    }

    /// Reload with unchanged identity: join additions, part removals.
    async fn reconcile(
        &mut self,
        writer: &mut OwnedWriteHalf,
        channels: Vec<ChannelSettings>,
        shared: SessionShared,
    ) -> anyhow::Result<()> {
        let old: HashSet<String> = self.cfg.channels.iter().map(|c| c.name.clone()).collect();
        let new: HashSet<String> = channels.iter().map(|c| c.name.clone()).collect();

        if self.can_deliver() {
            for added in new.difference(&old) {
                info!(network = %self.cfg.network, channel = %added, "joining");
                send_line(writer, &message::join(added)).await?;
            }
            for removed in old.difference(&new) {
                info!(network = %self.cfg.network, channel = %removed, "parting");
                send_line(writer, &message::part(removed)).await?;
                self.joined.remove(removed);
            }
        }

        self.cfg.channels = channels;
        self.shared = shared;
        Ok(())
    }
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await
}

/// Transient nick used while the desired one is taken.
fn transient_nick(desired: &str) -> String {
    format!("{desired}{}", rand::thread_rng().gen_range(100..1000))
}

/// If the first word is the bot's nick followed by `:` or `,`, return the
/// remainder of the message.
fn addressed<'a>(text: &'a str, nick: &str) -> Option<&'a str> {
    let (first, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let first = first.strip_suffix([':', ','])?;
    first.eq_ignore_ascii_case(nick).then(|| rest.trim_start())
}

/// Reply for a `!bangword` command.
fn command_reply(body: &str, nick: &str) -> String {
    let word = body
        .trim_start_matches('!')
        .split_whitespace()
        .next()
        .unwrap_or("");
    if word == "version" {
        format!("Tried /CTCP {nick} VERSION?")
    } else {
        format!("command '{word}' is not known")
    }
}
