//! Wire codec for the single `commit` RPC method.
//!
//! The call travels as a JSON envelope over HTTP POST. Three positional
//! argument layouts exist: v0 (6 args, cleartext password), v1 (9 args,
//! SHA-1 checksum) and v2 (10 args, checksum plus a display-only revision
//! prefix). The checksum covers the UTF-8 concatenation of every payload
//! field and the repository password, in argument order, with no separator;
//! the v2 `rev_prefix` is never hashed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};

/// The one method name the server dispatches.
pub const COMMIT_METHOD: &str = "commit";

/// Request envelope: method plus positional argument list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
}

/// Fault codes surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    /// Bad arity, unknown protocol/repository, bad UTF-8 or failed auth.
    #[serde(rename = "Client.Arguments")]
    Arguments,
    /// The IRC send backlog is saturated; retry elsewhere or later.
    #[serde(rename = "Client.Slowdown")]
    Slowdown,
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCode::Arguments => write!(f, "Client.Arguments"),
            FaultCode::Slowdown => write!(f, "Client.Slowdown"),
        }
    }
}

/// RPC fault payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub code: FaultCode,
    #[serde(rename = "string")]
    pub faultstring: String,
}

/// Response envelope: `{"result": "OK"}` or a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Ok { result: String },
    Fault { fault: Fault },
}

impl RpcResponse {
    pub fn ok() -> Self {
        RpcResponse::Ok {
            result: "OK".to_string(),
        }
    }

    pub fn fault(code: FaultCode, reason: impl Into<String>) -> Self {
        RpcResponse::Fault {
            fault: Fault {
                code,
                faultstring: reason.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RpcResponse::Ok { .. })
    }
}

/// Authentication material carried by a decoded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProof {
    /// v0: cleartext repository password.
    Password(String),
    /// v1/v2: SHA-1 hex checksum over payload and password.
    Checksum(String),
}

/// A fully decoded `commit` call, version differences normalised away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCall {
    pub version: u32,
    pub repo_id: String,
    pub auth: AuthProof,
    /// Display prefix for the revision (v2 only), e.g. `"r"` for Subversion.
    pub rev_prefix: Option<String>,
    pub revision: String,
    /// Raw change strings in canonical form; parsed later by the formatter.
    pub changes: Vec<String>,
    pub log: String,
    pub author: String,
    pub branch: Option<String>,
    pub module: Option<String>,
}

impl CommitCall {
    /// Recompute the v1/v2 checksum for this call with the given password.
    pub fn expected_checksum(&self, password: &str) -> String {
        auth_checksum(
            &self.repo_id,
            &self.revision,
            &self.changes,
            &self.log,
            &self.author,
            self.branch.as_deref(),
            self.module.as_deref(),
            password,
        )
    }
}

/// Decode failure; every variant maps to `Client.Arguments` on the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown method {0:?}")]
    BadMethod(String),
    #[error("wrong number of arguments ({0})")]
    BadArity(usize),
    #[error("unknown protocol version {0}")]
    UnknownVersion(i64),
    #[error("argument {0} has the wrong type")]
    BadArgument(usize),
}

/// SHA-1 hex over the UTF-8 byte concatenation of payload and password.
#[allow(clippy::too_many_arguments)]
pub fn auth_checksum(
    repo_id: &str,
    revision: &str,
    changes: &[String],
    log: &str,
    author: &str,
    branch: Option<&str>,
    module: Option<&str>,
    password: &str,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(revision.as_bytes());
    for change in changes {
        hasher.update(change.as_bytes());
    }
    hasher.update(log.as_bytes());
    hasher.update(author.as_bytes());
    if let Some(branch) = branch {
        hasher.update(branch.as_bytes());
    }
    if let Some(module) = module {
        hasher.update(module.as_bytes());
    }
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl RpcRequest {
    /// v0 layout: `(repo_id, password, revision, changes, log, author)`.
    pub fn commit_v0(
        repo_id: &str,
        password: &str,
        revision: &str,
        changes: &[String],
        log: &str,
        author: &str,
    ) -> Self {
        Self {
            method: COMMIT_METHOD.to_string(),
            params: vec![
                Value::from(repo_id),
                Value::from(password),
                Value::from(revision),
                changes_value(changes),
                Value::from(log),
                Value::from(author),
            ],
        }
    }

    /// v1 layout: `(1, repo_id, checksum, revision, changes, log, author,
    /// branch|null, module|null)`.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_v1(
        repo_id: &str,
        checksum: &str,
        revision: &str,
        changes: &[String],
        log: &str,
        author: &str,
        branch: Option<&str>,
        module: Option<&str>,
    ) -> Self {
        Self {
            method: COMMIT_METHOD.to_string(),
            params: vec![
                Value::from(1),
                Value::from(repo_id),
                Value::from(checksum),
                Value::from(revision),
                changes_value(changes),
                Value::from(log),
                Value::from(author),
                opt_value(branch),
                opt_value(module),
            ],
        }
    }

    /// v2 layout: v1 plus a display-only `rev_prefix` before the revision.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_v2(
        repo_id: &str,
        checksum: &str,
        rev_prefix: &str,
        revision: &str,
        changes: &[String],
        log: &str,
        author: &str,
        branch: Option<&str>,
        module: Option<&str>,
    ) -> Self {
        Self {
            method: COMMIT_METHOD.to_string(),
            params: vec![
                Value::from(2),
                Value::from(repo_id),
                Value::from(checksum),
                Value::from(rev_prefix),
                Value::from(revision),
                changes_value(changes),
                Value::from(log),
                Value::from(author),
                opt_value(branch),
                opt_value(module),
            ],
        }
    }
}

fn changes_value(changes: &[String]) -> Value {
    Value::Array(changes.iter().map(|c| Value::from(c.as_str())).collect())
}

fn opt_value(v: Option<&str>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

/// Decode a request envelope into a normalised [`CommitCall`].
pub fn decode_commit(request: &RpcRequest) -> Result<CommitCall, ProtocolError> {
    if request.method != COMMIT_METHOD {
        return Err(ProtocolError::BadMethod(request.method.clone()));
    }
    decode_params(&request.params)
}

/// Decode the positional argument list.
///
/// Arity discrimination: a list of exactly 6 args, or one whose first arg is
/// not an integer, is v0. Otherwise the first arg is the protocol version
/// and the rest follow that version's layout.
pub fn decode_params(params: &[Value]) -> Result<CommitCall, ProtocolError> {
    let first_is_int = params.first().map(Value::is_i64).unwrap_or(false);
    if params.len() == 6 || !first_is_int {
        return decode_v0(params);
    }

    let version = params[0].as_i64().ok_or(ProtocolError::BadArgument(0))?;
    let rest = &params[1..];
    match version {
        1 => decode_v1(rest),
        2 => decode_v2(rest),
        v => Err(ProtocolError::UnknownVersion(v)),
    }
}

fn decode_v0(params: &[Value]) -> Result<CommitCall, ProtocolError> {
    if params.len() != 6 {
        return Err(ProtocolError::BadArity(params.len()));
    }
    Ok(CommitCall {
        version: 0,
        repo_id: str_arg(params, 0)?,
        auth: AuthProof::Password(str_arg(params, 1)?),
        rev_prefix: None,
        revision: str_arg(params, 2)?,
        changes: changes_arg(params, 3)?,
        log: str_arg(params, 4)?,
        author: str_arg(params, 5)?,
        branch: None,
        module: None,
    })
}

fn decode_v1(args: &[Value]) -> Result<CommitCall, ProtocolError> {
    if args.len() != 8 {
        return Err(ProtocolError::BadArity(args.len() + 1));
    }
    Ok(CommitCall {
        version: 1,
        repo_id: str_arg(args, 0)?,
        auth: AuthProof::Checksum(str_arg(args, 1)?),
        rev_prefix: None,
        revision: str_arg(args, 2)?,
        changes: changes_arg(args, 3)?,
        log: str_arg(args, 4)?,
        author: str_arg(args, 5)?,
        branch: opt_str_arg(args, 6)?,
        module: opt_str_arg(args, 7)?,
    })
}

fn decode_v2(args: &[Value]) -> Result<CommitCall, ProtocolError> {
    if args.len() != 9 {
        return Err(ProtocolError::BadArity(args.len() + 1));
    }
    Ok(CommitCall {
        version: 2,
        repo_id: str_arg(args, 0)?,
        auth: AuthProof::Checksum(str_arg(args, 1)?),
        rev_prefix: Some(str_arg(args, 2)?),
        revision: str_arg(args, 3)?,
        changes: changes_arg(args, 4)?,
        log: str_arg(args, 5)?,
        author: str_arg(args, 6)?,
        branch: opt_str_arg(args, 7)?,
        module: opt_str_arg(args, 8)?,
    })
}

fn str_arg(args: &[Value], idx: usize) -> Result<String, ProtocolError> {
    args.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::BadArgument(idx))
}

fn opt_str_arg(args: &[Value], idx: usize) -> Result<Option<String>, ProtocolError> {
    match args.get(idx) {
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        _ => Err(ProtocolError::BadArgument(idx)),
    }
}

fn changes_arg(args: &[Value], idx: usize) -> Result<Vec<String>, ProtocolError> {
    let list = args
        .get(idx)
        .and_then(Value::as_array)
        .ok_or(ProtocolError::BadArgument(idx))?;
    list.iter()
        .map(|v| v.as_str().map(str::to_string).ok_or(ProtocolError::BadArgument(idx)))
        .collect()
}
