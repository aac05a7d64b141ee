//! Git extraction driven by post-receive reflog lines.
//!
//! The hook feeds `old new ref` lines (one per updated ref). Branch pushes
//! expand to the pushed commits oldest-first; a branch creation additionally
//! emits a synthetic "branch created" commit, and tags emit a single commit
//! on the pseudo-branch `tags` carrying the tag name as an added path.

use super::CommitSource;
use anyhow::{Context, Result, anyhow};
use kgb_common::encoding::normalize_utf8;
use kgb_common::{Action, Change, Commit};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// One `old new ref` line from the post-receive hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old: String,
    pub new: String,
    pub refname: String,
}

impl RefUpdate {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(old), Some(new), Some(refname), None) => Ok(Self {
                old: old.to_string(),
                new: new.to_string(),
                refname: refname.to_string(),
            }),
            _ => Err(anyhow!("malformed reflog line {line:?}")),
        }
    }

    fn created(&self) -> bool {
        is_zero_sha(&self.old)
    }

    fn deleted(&self) -> bool {
        is_zero_sha(&self.new)
    }
}

fn is_zero_sha(sha: &str) -> bool {
    !sha.is_empty() && sha.bytes().all(|b| b == b'0')
}

/// First 7 characters of a SHA, the display form used everywhere.
fn short_id(sha: &str) -> &str {
    &sha[..sha.len().min(7)]
}

/// Short login: the local part of an author email.
fn localpart(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Compose the log for a tag commit: the tag message when there is one,
/// always ending with the tagged-commit line.
fn tag_log(message: Option<&str>, target_sha: &str) -> String {
    match message {
        Some(m) if !m.trim().is_empty() => {
            format!("{}\ntagged commit: {}", m.trim_end(), short_id(target_sha))
        }
        _ => format!("tagged commit: {}", short_id(target_sha)),
    }
}

/// Parse `git show --name-status` lines into changes.
fn parse_name_status(lines: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    for line in lines.lines() {
        let Some((status, path)) = line.split_once('\t') else {
            continue;
        };
        let action = match status.chars().next() {
            Some('A') => Action::Added,
            Some('D') => Action::Deleted,
            Some('R') => Action::Replaced,
            Some('M') | Some('T') => Action::Modified,
            _ => continue,
        };
        // Renames carry "old\tnew"; keep the destination path.
        let path = path.rsplit('\t').next().unwrap_or(path);
        changes.push(Change::new(action, path));
    }
    changes
}

/// Parse a `git cat-file tag` body into the tagged object and the message.
fn parse_tag_object(text: &str) -> (Option<String>, Option<String>) {
    let mut object = None;
    let mut lines = text.lines();
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some(sha) = line.strip_prefix("object ") {
            object = Some(sha.to_string());
        }
    }
    let message: String = lines.collect::<Vec<_>>().join("\n");
    let message = (!message.trim().is_empty()).then_some(message);
    (object, message)
}

/// Commit source for a git repository.
pub struct GitSource {
    repo_dir: PathBuf,
    updates: Vec<RefUpdate>,
}

impl GitSource {
    /// Read reflog lines from the given reader (the hook's stdin, or a file).
    pub fn from_reflog(reader: impl BufRead, repo_dir: PathBuf) -> Result<Self> {
        let mut updates = Vec::new();
        for line in reader.lines() {
            let line = line.context("reading reflog")?;
            if line.trim().is_empty() {
                continue;
            }
            updates.push(RefUpdate::parse(&line)?);
        }
        Ok(Self { repo_dir, updates })
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .output()
            .with_context(|| format!("running git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        // Repositories hold whatever encoding their authors used; anything
        // that is not UTF-8 is read as Latin-1 before it reaches the wire.
        Ok(normalize_utf8(&output.stdout))
    }

    fn commit_at(&self, sha: &str, branch: &str) -> Result<Commit> {
        let meta = self.git(&["show", "-s", "--pretty=format:%h%x01%ae%x01%B", sha])?;
        let mut fields = meta.splitn(3, '\x01');
        let id = fields.next().unwrap_or(sha).to_string();
        let author = localpart(fields.next().unwrap_or("")).to_string();
        let log = fields.next().unwrap_or("").trim_end().to_string();

        let status = self.git(&["show", "--name-status", "--no-renames", "--pretty=format:", sha])?;
        Ok(Commit::new(id, author, log)
            .with_changes(parse_name_status(&status))
            .with_branch(branch))
    }

    fn rev_list(&self, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .git(args)?
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn branch_commits(&mut self, update: &RefUpdate, branch: &str) -> Result<Vec<Commit>> {
        let mut out = Vec::new();
        if update.deleted() {
            out.push(Commit::new(short_id(&update.old), "", "branch deleted").with_branch(branch));
            return Ok(out);
        }

        let shas = if update.created() {
            // New branch: announce it, then whatever commits it brings that
            // no other ref already reaches.
            out.push(Commit::new(short_id(&update.new), "", "branch created").with_branch(branch));
            let exclude = format!("--exclude=refs/heads/{branch}");
            self.rev_list(&[
                "rev-list",
                "--reverse",
                &update.new,
                "--not",
                &exclude,
                "--branches",
            ])?
        } else {
            let range = format!("{}..{}", update.old, update.new);
            self.rev_list(&["rev-list", "--reverse", &range])?
        };

        for sha in shas {
            out.push(self.commit_at(&sha, branch)?);
        }
        Ok(out)
    }

    fn tag_commit(&mut self, update: &RefUpdate, tag: &str) -> Result<Commit> {
        if update.deleted() {
            return Ok(Commit::new(short_id(&update.old), "", "tag deleted")
                .with_changes(vec![Change::new(Action::Deleted, tag)])
                .with_branch("tags"));
        }

        let obj_type = self.git(&["cat-file", "-t", &update.new])?;
        let (log, author) = if obj_type.trim() == "tag" {
            let body = self.git(&["cat-file", "tag", &update.new])?;
            let (object, message) = parse_tag_object(&body);
            let target = object.unwrap_or_else(|| update.new.clone());
            let tagger = self.git(&["for-each-ref", "--format=%(taggeremail:localpart)", &update.refname])?;
            (tag_log(message.as_deref(), &target), tagger.trim().to_string())
        } else {
            let email = self.git(&["log", "-1", "--pretty=format:%ae", &update.new])?;
            (
                tag_log(None, &update.new),
                localpart(email.trim()).to_string(),
            )
        };

        Ok(Commit::new(short_id(&update.new), author, log)
            .with_changes(vec![Change::new(Action::Added, tag)])
            .with_branch("tags"))
    }
}

impl CommitSource for GitSource {
    fn rev_prefix(&self) -> &str {
        ""
    }

    fn collect(&mut self) -> Result<Vec<Commit>> {
        let updates = self.updates.clone();
        let mut commits = Vec::new();
        for update in &updates {
            debug!(refname = %update.refname, "processing ref update");
            if let Some(branch) = update.refname.strip_prefix("refs/heads/") {
                let branch = branch.to_string();
                commits.extend(self.branch_commits(update, &branch)?);
            } else if let Some(tag) = update.refname.strip_prefix("refs/tags/") {
                let tag = tag.to_string();
                commits.push(self.tag_commit(update, &tag)?);
            } else {
                debug!(refname = %update.refname, "ignoring non-branch, non-tag ref");
            }
        }
        Ok(commits)
    }
}
