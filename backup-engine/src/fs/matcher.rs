//! Include/exclude pattern matching for discovered files.
//!
//! Patterns are glob-style (`*` matches any run of characters including `/`,
//! `?` a single character). Name patterns apply to the base name only, path
//! patterns to the full forward-slash path.

use crate::config::{ExcludeConfig, RootConfig};
use crate::utils::errors::{BackupError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// A compiled list of glob patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: GlobSet,
    len: usize,
}

impl PatternSet {
    /// Compile `patterns`. Inclusion matching is case-sensitive; only
    /// interactive search asks for `case_insensitive`.
    pub fn new(patterns: &[String], case_insensitive: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .literal_separator(false)
                .build()
                .map_err(|source| BackupError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }

        let set = builder.build().map_err(|source| BackupError::Pattern {
            pattern: patterns.join(", "),
            source,
        })?;

        Ok(Self {
            set,
            len: patterns.len(),
        })
    }

    /// Single case-insensitive pattern, as used by search and restore.
    pub fn search(pattern: &str) -> Result<Self> {
        Self::new(&[pattern.to_string()], true)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.set.is_match(candidate)
    }

    /// Include semantics: an empty list stands for `*`.
    fn includes(&self, candidate: &str) -> bool {
        self.is_empty() || self.is_match(candidate)
    }
}

/// Decides whether a candidate file participates in a backup.
#[derive(Debug, Clone)]
pub struct Matcher {
    name_includes: PatternSet,
    path_includes: PatternSet,
    name_excludes: PatternSet,
    path_excludes: PatternSet,
}

impl Matcher {
    pub fn new(
        name_includes: &[String],
        path_includes: &[String],
        name_excludes: &[String],
        path_excludes: &[String],
    ) -> Result<Self> {
        Ok(Self {
            name_includes: PatternSet::new(name_includes, false)?,
            path_includes: PatternSet::new(path_includes, false)?,
            name_excludes: PatternSet::new(name_excludes, false)?,
            path_excludes: PatternSet::new(path_excludes, false)?,
        })
    }

    /// Matcher for one configured root combined with the global excludes.
    pub fn for_root(root: &RootConfig, exclude: &ExcludeConfig) -> Result<Self> {
        Self::new(
            &root.name_patterns,
            &root.path_patterns,
            &exclude.name_patterns,
            &exclude.path_patterns,
        )
    }

    /// `path` must already be forward-slash normalized.
    pub fn matches(&self, path: &str) -> bool {
        let name = base_name(path);

        let included = self.name_includes.includes(name) && self.path_includes.includes(path);
        if !included {
            return false;
        }

        !(self.name_excludes.is_match(name) || self.path_excludes.is_match(path))
    }
}

/// One-shot form of [`Matcher::matches`].
pub fn matches(
    candidate: &str,
    name_includes: &[String],
    path_includes: &[String],
    name_excludes: &[String],
    path_excludes: &[String],
) -> Result<bool> {
    Ok(Matcher::new(name_includes, path_includes, name_excludes, path_excludes)?.matches(candidate))
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
