//! KGB client - repository hook front-end
//!
//! Invoked from a VCS hook, extracts the just-accepted commits and relays
//! them to one of the configured KGB servers.

#![forbid(unsafe_code)]

mod branches;
mod config;
mod relay;
mod vcs;

use anyhow::{Context, Result, bail};
use branches::BranchModuleMapper;
use clap::{Parser, ValueEnum};
use config::{ConfFile, DEFAULT_TIMEOUT_SECS, ServerRef};
use kgb_common::Commit;
use relay::{HttpTransport, Relay};
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vcs::CommitSource;
use vcs::git::GitSource;
use vcs::svn::SvnSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RepoKind {
    Svn,
    Git,
}

#[derive(Parser)]
#[command(name = "kgb-client")]
#[command(author, version, about = "Relay VCS commits to a KGB server")]
struct Cli {
    /// Path to the client conf file
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Logical URI of a server (repeatable via the conf file)
    #[arg(long)]
    uri: Option<String>,

    /// Actual HTTP endpoint (defaults to URI + "?session=KGB")
    #[arg(long)]
    proxy: Option<String>,

    /// Repository id known to the server
    #[arg(long = "repo-id")]
    repo_id: Option<String>,

    /// Password for the server given on the command line
    #[arg(long)]
    password: Option<String>,

    /// Per-server timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Regex with two capture groups extracting branch and module from paths
    #[arg(long = "branch-and-module-re")]
    branch_and_module_re: Vec<String>,

    /// Exchange the two captures (module first, branch second)
    #[arg(long = "branch-and-module-re-swap")]
    branch_and_module_re_swap: bool,

    /// Module name to announce, overriding any extracted one
    #[arg(long)]
    module: Option<String>,

    /// Suppress commits on this branch entirely
    #[arg(long = "ignore-branch")]
    ignore_branch: Option<String>,

    /// Repository type
    #[arg(long, value_enum, default_value_t = RepoKind::Svn)]
    repository: RepoKind,

    /// Reflog file for git ("-" reads the hook's stdin)
    #[arg(long = "git-reflog")]
    git_reflog: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// For svn: <repo-path> <revision>
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let conf = match &cli.conf {
        Some(path) => config::load_conf(path)?,
        None => ConfFile::default(),
    };

    let repo_id = cli
        .repo_id
        .clone()
        .or_else(|| conf.repo_id.clone())
        .context("--repo-id is required")?;

    let servers = assemble_servers(&cli, &conf)?;
    if servers.is_empty() {
        bail!("no servers configured; pass --uri or a conf file with servers");
    }

    let patterns: Vec<String> = if cli.branch_and_module_re.is_empty() {
        conf.branch_and_module_re.clone()
    } else {
        cli.branch_and_module_re.clone()
    };
    let swap = cli.branch_and_module_re_swap || conf.branch_and_module_re_swap;
    let mapper = if patterns.is_empty() {
        None
    } else {
        Some(BranchModuleMapper::new(&patterns, swap)?)
    };
    let module_override = cli.module.clone().or_else(|| conf.module.clone());
    let ignore_branch = cli.ignore_branch.clone().or_else(|| conf.ignore_branch.clone());

    let mut source = build_source(&cli)?;
    let rev_prefix = source.rev_prefix().to_string();
    let commits = source.collect()?;
    debug!(count = commits.len(), "extracted commits");

    let mut relay = Relay::new(servers, HttpTransport::new());
    for mut commit in commits {
        shape_commit(&mut commit, mapper.as_ref(), module_override.as_deref());
        if let (Some(ignored), Some(branch)) = (&ignore_branch, &commit.branch) {
            if ignored == branch {
                debug!(branch = %branch, "skipping ignored branch");
                continue;
            }
        }
        relay
            .relay_commit(&repo_id, &rev_prefix, &commit)
            .await
            .with_context(|| format!("relaying revision {}", commit.id))?;
    }

    Ok(())
}

/// Conf-file servers plus the one assembled from bare CLI flags.
fn assemble_servers(cli: &Cli, conf: &ConfFile) -> Result<Vec<ServerRef>> {
    let mut servers = conf.servers(cli.verbose)?;

    if cli.uri.is_some() || cli.proxy.is_some() {
        let uri = cli
            .uri
            .clone()
            .or_else(|| cli.proxy.clone())
            .expect("checked above");
        let password = cli
            .password
            .clone()
            .or_else(|| conf.password.clone())
            .context("--password is required with --uri")?;
        let timeout = cli
            .timeout
            .or(conf.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let mut server =
            ServerRef::new(uri, password).with_timeout(Duration::from_secs(timeout));
        if let Some(proxy) = &cli.proxy {
            server = server.with_proxy(proxy);
        }
        server.verbose = cli.verbose;
        servers.push(server);
    }

    Ok(servers)
}

fn build_source(cli: &Cli) -> Result<Box<dyn CommitSource>> {
    match cli.repository {
        RepoKind::Svn => {
            let [repo_path, revision] = cli.args.as_slice() else {
                bail!("svn mode needs positional <repo-path> <revision>");
            };
            Ok(Box::new(SvnSource::new(
                PathBuf::from(repo_path),
                revision.clone(),
            )))
        }
        RepoKind::Git => {
            let reflog = cli
                .git_reflog
                .as_deref()
                .context("git mode needs --git-reflog PATH|-")?;
            let repo_dir = std::env::current_dir()?;
            let source = if reflog == "-" {
                GitSource::from_reflog(std::io::stdin().lock(), repo_dir)?
            } else {
                let file = std::fs::File::open(reflog)
                    .with_context(|| format!("opening reflog {reflog}"))?;
                GitSource::from_reflog(BufReader::new(file), repo_dir)?
            };
            Ok(Box::new(source))
        }
    }
}

/// Apply branch/module extraction and overrides to one commit.
fn shape_commit(commit: &mut Commit, mapper: Option<&BranchModuleMapper>, module: Option<&str>) {
    if let Some(mapper) = mapper {
        let mut paths: Vec<String> = commit.changes.iter().map(|c| c.path.clone()).collect();
        if let Some(extracted) = mapper.apply(&mut paths) {
            for (change, path) in commit.changes.iter_mut().zip(paths) {
                change.path = path;
            }
            if commit.branch.is_none() && !extracted.branch.is_empty() {
                commit.branch = Some(extracted.branch);
            }
            if commit.module.is_none() && !extracted.module.is_empty() {
                commit.module = Some(extracted.module);
            }
        }
    }
    if let Some(module) = module {
        commit.module = Some(module.to_string());
    }
}
