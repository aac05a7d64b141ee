//! Subversion extraction via `svnlook`.

use super::CommitSource;
use anyhow::{Context, Result, anyhow};
use kgb_common::encoding::normalize_utf8;
use kgb_common::{Action, Change, Commit};
use std::path::PathBuf;
use std::process::Command;

/// Commit source for one accepted Subversion revision.
pub struct SvnSource {
    repo_path: PathBuf,
    revision: String,
}

impl SvnSource {
    pub fn new(repo_path: PathBuf, revision: String) -> Self {
        Self {
            repo_path,
            revision,
        }
    }

    fn svnlook(&self, subcommand: &str) -> Result<String> {
        let output = Command::new("svnlook")
            .arg(subcommand)
            .arg("-r")
            .arg(&self.revision)
            .arg(&self.repo_path)
            .output()
            .with_context(|| format!("running svnlook {subcommand}"))?;
        if !output.status.success() {
            return Err(anyhow!(
                "svnlook {subcommand} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(normalize_utf8(&output.stdout))
    }
}

/// Parse `svnlook changed` output.
///
/// Each line is two flag columns and a path: the first column is the content
/// change (`A`, `D`, `U` or `_` for none), the second is `U` when properties
/// changed. Paths are made absolute with a leading `/`, matching the wire
/// form the server expects.
fn parse_changed(output: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let (flags, path) = line.split_at(2);
        let path = path.trim_start();
        if path.is_empty() {
            continue;
        }
        let mut flag_chars = flags.chars();
        let content = flag_chars.next().unwrap_or(' ');
        let props = flag_chars.next().unwrap_or(' ');

        let action = match content {
            'A' => Action::Added,
            'D' => Action::Deleted,
            'U' | '_' => Action::Modified,
            _ => continue,
        };
        let mut change = Change::new(action, format!("/{path}"));
        change.prop_change = props == 'U' || content == '_';
        changes.push(change);
    }
    changes
}

impl CommitSource for SvnSource {
    fn rev_prefix(&self) -> &str {
        "r"
    }

    fn collect(&mut self) -> Result<Vec<Commit>> {
        let author = self.svnlook("author")?.trim().to_string();
        let log = self.svnlook("log")?.trim_end().to_string();
        let changes = parse_changed(&self.svnlook("changed")?);

        Ok(vec![
            Commit::new(self.revision.clone(), author, log).with_changes(changes),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_lines_map_to_actions() {
        let changes = parse_changed("A   trunk/new\nU   trunk/mod\nD   trunk/old\n");
        assert_eq!(
            changes,
            vec![
                Change::new(Action::Added, "/trunk/new"),
                Change::new(Action::Modified, "/trunk/mod"),
                Change::new(Action::Deleted, "/trunk/old"),
            ]
        );
    }

    #[test]
    fn property_flags_set_prop_change() {
        let changes = parse_changed("_U  trunk/props-only\nUU  trunk/both\n");
        assert_eq!(changes.len(), 2);
        assert!(changes[0].prop_change);
        assert_eq!(changes[0].action, Action::Modified);
        assert!(changes[1].prop_change);
        assert_eq!(changes[1].action, Action::Modified);
    }

    #[test]
    fn junk_lines_are_skipped() {
        assert!(parse_changed("\nxx\n??  \n").is_empty());
    }
}
