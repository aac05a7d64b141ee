//! Server failover driver and HTTP submission.
//!
//! Each invocation shuffles the configured servers, bumps the last server
//! that accepted a call to the front, and walks the list until one accepts.
//! Stickiness keeps consecutive commits on the server that already holds
//! the de-duplication state for them; the shuffle spreads load across many
//! hook invocations.

use crate::config::ServerRef;
use async_trait::async_trait;
use kgb_common::{auth_checksum, Commit, Fault, RpcRequest, RpcResponse};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

/// Failure of a single submission attempt.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("server fault {}: {}", .0.code, .0.faultstring)]
    Fault(Fault),
}

/// Failure of a whole relay operation, after trying every server.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("no servers configured")]
    NoServers,
    #[error("all {attempts} server attempts failed")]
    AllServersFailed { attempts: usize },
}

/// Seam between the failover driver and the actual HTTP stack.
#[async_trait]
pub trait CommitTransport {
    async fn send(
        &self,
        server: &ServerRef,
        request: &RpcRequest,
    ) -> Result<RpcResponse, SubmitError>;
}

/// Production transport: JSON POST to the server's proxy endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommitTransport for HttpTransport {
    async fn send(
        &self,
        server: &ServerRef,
        request: &RpcRequest,
    ) -> Result<RpcResponse, SubmitError> {
        let response = self
            .client
            .post(&server.proxy)
            .timeout(server.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status.as_u16()));
        }

        let decoded: RpcResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        match decoded {
            RpcResponse::Fault { fault } => Err(SubmitError::Fault(fault)),
            ok => Ok(ok),
        }
    }
}

/// Failover driver over a set of configured servers.
///
/// One `Relay` lives for exactly one hook invocation but may carry several
/// commits, so the sticky slot is a plain field.
pub struct Relay<T> {
    servers: Vec<ServerRef>,
    transport: T,
    last_good: Option<String>,
}

impl<T: CommitTransport> Relay<T> {
    pub fn new(servers: Vec<ServerRef>, transport: T) -> Self {
        Self {
            servers,
            transport,
            last_good: None,
        }
    }

    /// Submit one commit, trying servers until one accepts.
    pub async fn relay_commit(
        &mut self,
        repo_id: &str,
        rev_prefix: &str,
        commit: &Commit,
    ) -> Result<(), RelayError> {
        if self.servers.is_empty() {
            return Err(RelayError::NoServers);
        }

        let changes: Vec<String> = commit.changes.iter().map(ToString::to_string).collect();
        let order = self.attempt_order();
        let mut attempts = 0;

        for idx in order {
            let server = &self.servers[idx];
            attempts += 1;

            let checksum = auth_checksum(
                repo_id,
                &commit.id,
                &changes,
                &commit.log,
                &commit.author,
                commit.branch.as_deref(),
                commit.module.as_deref(),
                &server.password,
            );
            let request = RpcRequest::commit_v2(
                repo_id,
                &checksum,
                rev_prefix,
                &commit.id,
                &changes,
                &commit.log,
                &commit.author,
                commit.branch.as_deref(),
                commit.module.as_deref(),
            );

            if server.verbose {
                info!(uri = %server.uri, revision = %commit.id, "submitting commit");
            } else {
                debug!(uri = %server.uri, revision = %commit.id, "submitting commit");
            }
            match self.transport.send(server, &request).await {
                Ok(_) => {
                    info!(uri = %server.uri, revision = %commit.id, "commit accepted");
                    self.last_good = Some(server.uri.clone());
                    return Ok(());
                }
                Err(e) => {
                    warn!(uri = %server.uri, error = %e, "server failed, trying next");
                }
            }
        }

        Err(RelayError::AllServersFailed { attempts })
    }

    /// Random permutation of server indices, sticky server first.
    fn attempt_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.servers.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        if let Some(last) = &self.last_good {
            if let Some(pos) = order.iter().position(|&i| self.servers[i].uri == *last) {
                let idx = order.remove(pos);
                order.insert(0, idx);
            }
        }
        order
    }
}
