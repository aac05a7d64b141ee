//! Branch and module extraction from commit paths.
//!
//! Repositories that keep several branches or modules under one tree encode
//! them in path prefixes (`branches/1.2/src/...`, `trunk/mod/...`). The
//! mapper applies user-supplied regexes with exactly two capture groups to
//! the commit's paths; the first full match across all paths names the
//! branch and module, and the matched prefix is then stripped from every
//! path that carries it.

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    #[error("invalid branch-and-module-re {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("branch-and-module-re {0:?} must have exactly two capture groups")]
    WrongGroupCount(String),
}

/// Branch and module extracted from a path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchAndModule {
    pub branch: String,
    pub module: String,
}

pub struct BranchModuleMapper {
    patterns: Vec<Regex>,
    swap: bool,
}

impl BranchModuleMapper {
    /// Compile the patterns, rejecting any that do not expose exactly two
    /// capture groups. `swap` exchanges which group names the branch.
    pub fn new(patterns: &[String], swap: bool) -> Result<Self, MapperError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            let re = Regex::new(p).map_err(|e| MapperError::BadPattern {
                pattern: p.clone(),
                source: e,
            })?;
            // captures_len counts the implicit whole-match group.
            if re.captures_len() != 3 {
                return Err(MapperError::WrongGroupCount(p.clone()));
            }
            compiled.push(re);
        }
        Ok(Self {
            patterns: compiled,
            swap,
        })
    }

    /// Apply the patterns in order; the first pattern that matches the start
    /// of any path wins. On a match, strips that pattern's matched prefix
    /// from every path it matches and returns the extracted pair.
    pub fn apply(&self, paths: &mut [String]) -> Option<BranchAndModule> {
        for re in &self.patterns {
            let hit = paths.iter().find_map(|path| {
                re.captures(path)
                    .filter(|c| c.get(0).is_some_and(|m| m.start() == 0))
            });
            let Some(captures) = hit else { continue };

            let (mut branch, mut module) = (
                captures.get(1).map_or("", |m| m.as_str()).to_string(),
                captures.get(2).map_or("", |m| m.as_str()).to_string(),
            );
            if self.swap {
                std::mem::swap(&mut branch, &mut module);
            }

            for path in paths.iter_mut() {
                if let Some(m) = re
                    .captures(path)
                    .and_then(|c| c.get(0))
                    .filter(|m| m.start() == 0)
                {
                    *path = path[m.end()..].to_string();
                }
            }
            return Some(BranchAndModule { branch, module });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(patterns: &[&str], swap: bool) -> BranchModuleMapper {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        BranchModuleMapper::new(&owned, swap).unwrap()
    }

    #[test]
    fn first_matching_pattern_wins_and_strips_prefix() {
        let m = mapper(&[r"^branches/([^/]+)/([^/]+)/"], false);
        let mut paths = vec![
            "branches/1.2/core/src/lib.rs".to_string(),
            "branches/1.2/core/README".to_string(),
            "unrelated/file".to_string(),
        ];
        let hit = m.apply(&mut paths).unwrap();
        assert_eq!(hit.branch, "1.2");
        assert_eq!(hit.module, "core");
        assert_eq!(paths[0], "src/lib.rs");
        assert_eq!(paths[1], "README");
        assert_eq!(paths[2], "unrelated/file");
    }

    #[test]
    fn patterns_apply_in_order() {
        let m = mapper(
            &[r"^trunk/()([^/]+)/", r"^branches/([^/]+)/([^/]+)/"],
            false,
        );
        let mut paths = vec!["branches/b1/m1/f".to_string()];
        let hit = m.apply(&mut paths).unwrap();
        assert_eq!(hit.branch, "b1");
        assert_eq!(hit.module, "m1");
    }

    #[test]
    fn swap_exchanges_the_captures() {
        let m = mapper(&[r"^([^/]+)/([^/]+)/"], true);
        let mut paths = vec!["modname/branchname/f".to_string()];
        let hit = m.apply(&mut paths).unwrap();
        assert_eq!(hit.branch, "branchname");
        assert_eq!(hit.module, "modname");
    }

    #[test]
    fn match_must_start_at_the_path_start() {
        let m = mapper(&[r"branches/([^/]+)/([^/]+)/"], false);
        let mut paths = vec!["deep/branches/x/y/f".to_string()];
        assert!(m.apply(&mut paths).is_none());
        assert_eq!(paths[0], "deep/branches/x/y/f");
    }

    #[test]
    fn wrong_group_count_is_rejected() {
        let err = BranchModuleMapper::new(&[r"^branches/([^/]+)/".to_string()], false);
        assert!(matches!(err, Err(MapperError::WrongGroupCount(_))));

        let err = BranchModuleMapper::new(&[r"^(a)(b)(c)".to_string()], false);
        assert!(matches!(err, Err(MapperError::WrongGroupCount(_))));
    }

    #[test]
    fn bad_regex_is_rejected() {
        let err = BranchModuleMapper::new(&[r"([".to_string()], false);
        assert!(matches!(err, Err(MapperError::BadPattern { .. })));
    }
}
