//! Commit and path-change model shared by client and server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happened to a path in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Path was added.
    Added,
    /// Path contents were modified.
    Modified,
    /// Path was deleted.
    Deleted,
    /// Path was replaced (deleted and re-added in one revision).
    Replaced,
}

impl Action {
    /// Single-letter code used in the canonical change string.
    pub fn letter(self) -> char {
        match self {
            Action::Added => 'A',
            Action::Modified => 'M',
            Action::Deleted => 'D',
            Action::Replaced => 'R',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'A' => Some(Action::Added),
            'M' => Some(Action::Modified),
            'D' => Some(Action::Deleted),
            'R' => Some(Action::Replaced),
            _ => None,
        }
    }
}

/// One modified path within a commit.
///
/// The canonical string form is `"(" action ["+"] ")" path`, where the `+`
/// marks a metadata-only (property) change. A plain modification with no
/// property change abbreviates to the bare path. [`FromStr`] is the exact
/// inverse of [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub action: Action,
    pub prop_change: bool,
    pub path: String,
}

impl Change {
    pub fn new(action: Action, path: impl Into<String>) -> Self {
        Self {
            action,
            prop_change: false,
            path: path.into(),
        }
    }

    pub fn with_prop_change(mut self) -> Self {
        self.prop_change = true;
        self
    }

    /// Path with the leading `/` stripped, as shown in announcements.
    pub fn display_path(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action == Action::Modified && !self.prop_change {
            return write!(f, "{}", self.path);
        }
        write!(
            f,
            "({}{}){}",
            self.action.letter(),
            if self.prop_change { "+" } else { "" },
            self.path
        )
    }
}

/// Error parsing the canonical change string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed change string {0:?}")]
pub struct ChangeParseError(pub String);

impl FromStr for Change {
    type Err = ChangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix('(') else {
            // Bare path: abbreviated plain modification.
            return Ok(Change::new(Action::Modified, s));
        };
        let mut chars = rest.chars();
        let action = chars
            .next()
            .and_then(Action::from_letter)
            .ok_or_else(|| ChangeParseError(s.to_string()))?;
        let rest = chars.as_str();
        let (prop_change, rest) = match rest.strip_prefix('+') {
            Some(r) => (true, r),
            None => (false, rest),
        };
        let path = rest
            .strip_prefix(')')
            .ok_or_else(|| ChangeParseError(s.to_string()))?;
        Ok(Change {
            action,
            prop_change,
            path: path.to_string(),
        })
    }
}

/// A single accepted commit, as handed to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Opaque revision id: 7-char SHA prefix for git, decimal rev for svn.
    pub id: String,
    /// Short author login, no domain part.
    pub author: String,
    /// Full commit log, possibly multi-line.
    pub log: String,
    /// Ordered path changes; may be empty for synthetic commits.
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
}

impl Commit {
    pub fn new(id: impl Into<String>, author: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            log: log.into(),
            changes: Vec::new(),
            branch: None,
            module: None,
        }
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_emits_canonical_form() {
        assert_eq!(Change::new(Action::Added, "/file").to_string(), "(A)/file");
        assert_eq!(Change::new(Action::Deleted, "doc/a").to_string(), "(D)doc/a");
        assert_eq!(
            Change::new(Action::Replaced, "x").with_prop_change().to_string(),
            "(R+)x"
        );
    }

    #[test]
    fn plain_modification_abbreviates_to_bare_path() {
        assert_eq!(Change::new(Action::Modified, "src/lib.rs").to_string(), "src/lib.rs");
        assert_eq!(
            Change::new(Action::Modified, "p").with_prop_change().to_string(),
            "(M+)p"
        );
    }

    #[test]
    fn parse_is_inverse_of_emit() {
        for s in ["(A)/file", "(D)a/b/c", "(R)x", "(M+)props", "(A+)new", "bare/path"] {
            let change: Change = s.parse().unwrap();
            assert_eq!(change.to_string(), s, "round-trip of {s:?}");
        }
    }

    #[test]
    fn emit_is_inverse_of_parse() {
        for change in [
            Change::new(Action::Added, "/file"),
            Change::new(Action::Modified, "file"),
            Change::new(Action::Modified, "file").with_prop_change(),
            Change::new(Action::Deleted, "a b"),
        ] {
            let reparsed: Change = change.to_string().parse().unwrap();
            assert_eq!(reparsed, change);
        }
    }

    #[test]
    fn parse_accepts_unabbreviated_modification() {
        // Clients may send the explicit form; it normalises to the bare path.
        let change: Change = "(M)/file".parse().unwrap();
        assert_eq!(change, Change::new(Action::Modified, "/file"));
        assert_eq!(change.to_string(), "/file");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("(X)path".parse::<Change>().is_err());
        assert!("(Apath".parse::<Change>().is_err());
    }

    #[test]
    fn display_path_strips_leading_slash() {
        assert_eq!(Change::new(Action::Added, "/file").display_path(), "file");
        assert_eq!(Change::new(Action::Added, "file").display_path(), "file");
    }
}
