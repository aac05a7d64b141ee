//! VCS extraction seam.
//!
//! The relay core never inspects a repository; it consumes commits from a
//! [`CommitSource`]. The two shipped sources drive the `git` and `svnlook`
//! binaries the way the repository hooks expect.

pub mod git;
pub mod svn;

use kgb_common::Commit;

/// A source of freshly accepted commits.
pub trait CommitSource {
    /// Display prefix for revisions (`"r"` for Subversion, empty for git).
    fn rev_prefix(&self) -> &str;

    /// Extract this invocation's commits, oldest first.
    fn collect(&mut self) -> anyhow::Result<Vec<Commit>>;
}
