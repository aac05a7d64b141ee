//! Admin gate: `nick!user@host` glob matching.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compiled admin mask list.
#[derive(Debug, Clone)]
pub struct AdminList {
    set: GlobSet,
}

impl AdminList {
    /// Compile the configured masks. IRC identifiers compare
    /// case-insensitively, so the globs do too.
    pub fn new(masks: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for mask in masks {
            builder.add(GlobBuilder::new(mask).case_insensitive(true).build()?);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
        }
    }

    /// Whether a full `nick!user@host` mask belongs to an admin.
    pub fn matches(&self, mask: &str) -> bool {
        self.set.is_match(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admins(masks: &[&str]) -> AdminList {
        let owned: Vec<String> = masks.iter().map(|m| m.to_string()).collect();
        AdminList::new(&owned).unwrap()
    }

    #[test]
    fn glob_masks_match_full_identities() {
        let list = admins(&["alice!*@*.example.net"]);
        assert!(list.matches("alice!ali@box.example.net"));
        assert!(!list.matches("bob!ali@box.example.net"));
        assert!(!list.matches("alice!ali@elsewhere.org"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let list = admins(&["Alice!*@*"]);
        assert!(list.matches("alice!x@y"));
        assert!(list.matches("ALICE!x@y"));
    }

    #[test]
    fn empty_list_matches_nobody() {
        assert!(!AdminList::empty().matches("alice!x@y"));
    }
}
