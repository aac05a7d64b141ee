//! RPC ingress: the HTTP endpoint accepting `commit` calls.
//!
//! One POST route at `/?session=<service_name>`. Each call runs the full
//! pipeline synchronously - decode, version gate, admission, repository
//! lookup, authentication, format, fan-out - so backpressure stays visible
//! to the caller.

use crate::config::Config;
use crate::fanout;
use crate::irc::SessionManager;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use kgb_common::protocol::AuthProof;
use kgb_common::{Change, FaultCode, RpcRequest, RpcResponse, decode_commit};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared state for the RPC handlers.
#[derive(Clone)]
pub struct RpcState {
    pub config: watch::Receiver<Arc<Config>>,
    pub manager: SessionManager,
}

/// Build the ingress router.
pub fn create_router(state: RpcState) -> Router {
    Router::new()
        .route("/", post(commit_handler))
        .with_state(Arc::new(state))
}

async fn commit_handler(
    State(state): State<Arc<RpcState>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<RpcResponse> {
    // Sample the config once; the whole call runs against this snapshot.
    let config = state.config.borrow().clone();
    let session = query.get("session").map(String::as_str);

    // The payload must be UTF-8; the server never transcodes.
    let Ok(body) = std::str::from_utf8(&body) else {
        return Json(fault_args("request body is not valid UTF-8"));
    };
    Json(handle_commit(&config, &state.manager, session, body))
}

/// The commit pipeline, transport-independent for testability.
pub fn handle_commit(
    config: &Config,
    manager: &SessionManager,
    session: Option<&str>,
    body: &str,
) -> RpcResponse {
    if session != Some(config.service_name.as_str()) {
        return fault_args("unknown service");
    }

    let request: RpcRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => return fault_args(format!("malformed request: {e}")),
    };

    let call = match decode_commit(&request) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "rejecting commit call");
            return fault_args(e.to_string());
        }
    };

    if call.version < config.min_protocol_ver {
        warn!(version = call.version, "rejecting too-old protocol");
        return fault_args(format!("protocol version {} not accepted", call.version));
    }

    // Admission: the IRC send backlog is the only queue in the system.
    let backlog = manager.total_backlog();
    if backlog > config.queue_limit {
        warn!(backlog, limit = config.queue_limit, "send queue saturated");
        return RpcResponse::fault(FaultCode::Slowdown, "message queue full");
    }

    let Some(repo) = config.repositories.get(&call.repo_id) else {
        warn!(repo = %call.repo_id, "unknown repository");
        return fault_args(format!("unknown repository {:?}", call.repo_id));
    };

    let authenticated = match &call.auth {
        // v0: cleartext compare; an empty configured password means the
        // repository accepts anonymous commits.
        AuthProof::Password(given) => {
            repo.password.is_empty() || constant_time_eq(given, &repo.password)
        }
        AuthProof::Checksum(given) => {
            constant_time_eq(given, &call.expected_checksum(&repo.password))
        }
    };
    if !authenticated {
        warn!(repo = %call.repo_id, "authentication failed");
        return fault_args("authentication failed");
    }

    let changes: Result<Vec<Change>, _> = call.changes.iter().map(|s| s.parse()).collect();
    let changes = match changes {
        Ok(changes) => changes,
        Err(e) => {
            warn!(repo = %call.repo_id, error = %e, "bad change list");
            return fault_args(e.to_string());
        }
    };

    let delivered = fanout::announce(config, manager, &call, &changes);
    info!(
        repo = %call.repo_id,
        revision = %call.revision,
        channels = delivered,
        "commit accepted"
    );
    RpcResponse::ok()
}

fn fault_args(reason: impl Into<String>) -> RpcResponse {
    RpcResponse::fault(FaultCode::Arguments, reason)
}

/// Length-leaking but content-constant-time comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
