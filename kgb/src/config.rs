//! Client configuration: conf file schema and CLI merging.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default per-server total timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// One configured KGB server.
///
/// `uri` is the logical identity used in logs and error reports; `proxy` is
/// the actual HTTP endpoint and defaults to `uri + "?session=KGB"`.
#[derive(Debug, Clone)]
pub struct ServerRef {
    pub uri: String,
    pub proxy: String,
    pub password: String,
    pub timeout: Duration,
    pub verbose: bool,
}

impl ServerRef {
    pub fn new(uri: impl Into<String>, password: impl Into<String>) -> Self {
        let uri = uri.into();
        let proxy = default_proxy(&uri);
        Self {
            uri,
            proxy,
            password: password.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verbose: false,
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn default_proxy(uri: &str) -> String {
    format!("{uri}?session=KGB")
}

/// Raw conf-file schema. Field names follow the historical dashed style.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfFile {
    #[serde(rename = "repo-id")]
    pub repo_id: Option<String>,
    /// Fallback password applied to servers that set none of their own.
    pub password: Option<String>,
    /// Fallback timeout in seconds.
    pub timeout: Option<u64>,
    #[serde(default)]
    pub servers: Vec<ConfServer>,
    #[serde(rename = "branch-and-module-re", default)]
    pub branch_and_module_re: Vec<String>,
    #[serde(rename = "branch-and-module-re-swap", default)]
    pub branch_and_module_re_swap: bool,
    pub module: Option<String>,
    #[serde(rename = "ignore-branch")]
    pub ignore_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfServer {
    pub uri: String,
    pub proxy: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
}

/// Load and parse a conf file.
pub fn load_conf(path: &Path) -> anyhow::Result<ConfFile> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let conf: ConfFile = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("cannot parse {}: {e}", path.display()))?;
    Ok(conf)
}

impl ConfFile {
    /// Materialise the server list, applying file-level fallbacks.
    ///
    /// Every server must end up with a password; a server without one is a
    /// configuration error.
    pub fn servers(&self, verbose: bool) -> anyhow::Result<Vec<ServerRef>> {
        let mut out = Vec::with_capacity(self.servers.len());
        for s in &self.servers {
            let password = s
                .password
                .clone()
                .or_else(|| self.password.clone())
                .ok_or_else(|| anyhow::anyhow!("server {} has no password", s.uri))?;
            let timeout = s.timeout.or(self.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS);
            let mut server = ServerRef::new(&s.uri, password)
                .with_timeout(Duration::from_secs(timeout));
            if let Some(proxy) = &s.proxy {
                server = server.with_proxy(proxy);
            }
            server.verbose = verbose;
            out.push(server);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn proxy_defaults_to_uri_with_session() {
        let s = ServerRef::new("http://kgb.example.net:5392/", "pw");
        assert_eq!(s.proxy, "http://kgb.example.net:5392/?session=KGB");
        assert_eq!(s.timeout, Duration::from_secs(15));
    }

    #[test]
    fn conf_file_parses_and_applies_fallbacks() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "repo-id: test\n\
             password: shared\n\
             timeout: 7\n\
             servers:\n\
             - uri: http://a.example.net/\n\
             - uri: http://b.example.net/\n\
             \x20 password: own\n\
             \x20 timeout: 3\n\
             \x20 proxy: http://b.example.net/kgb\n"
        )
        .unwrap();

        let conf = load_conf(f.path()).unwrap();
        assert_eq!(conf.repo_id.as_deref(), Some("test"));

        let servers = conf.servers(false).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].password, "shared");
        assert_eq!(servers[0].timeout, Duration::from_secs(7));
        assert_eq!(servers[1].password, "own");
        assert_eq!(servers[1].timeout, Duration::from_secs(3));
        assert_eq!(servers[1].proxy, "http://b.example.net/kgb");
    }

    #[test]
    fn server_without_any_password_is_an_error() {
        let conf: ConfFile =
            serde_yaml::from_str("servers:\n- uri: http://a.example.net/\n").unwrap();
        assert!(conf.servers(false).is_err());
    }
}
