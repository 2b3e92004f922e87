//! Provides the set of ignore patterns consulted while walking a source tree.
//!
//! To ignore paths, list globs under `[ignore]` in the rules file. For example:
//!
//! ```ignore
//! [ignore]
//! /home/*/.cache/
//! **/node_modules
//! ```
use std::path::{Path, MAIN_SEPARATOR};

use super::pattern::{Error, Pattern};

/// An unordered set of [`Pattern`]s. A path is ignored if *any* pattern matches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreFilter {
    patterns: Vec<Pattern>,
}

impl IgnoreFilter {
    /// Compile every glob in `globs` into a new filter.
    ///
    /// # Errors
    ///
    /// The first glob that fails to compile.
    pub fn new<I, S>(globs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        globs
            .into_iter()
            .map(|glob| Pattern::new(glob.as_ref()))
            .collect::<Result<_, _>>()
            .map(|patterns| Self { patterns })
    }

    /// A filter that ignores nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Add an already compiled pattern to the set.
    pub fn push(&mut self, pattern: Pattern) {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    /// Iterate over the patterns in this set.
    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    /// Whether any pattern matches the path string `path`.
    #[must_use]
    pub fn matches_any(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    /// Whether `path` is ignored.
    ///
    /// Directories are matched with a trailing `/` so a glob like `cache/` only ever
    /// matches directories.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.matches_any(&match_key(path, is_dir))
    }
}

/// The string form of `path` that patterns are matched against.
fn match_key(path: &Path, is_dir: bool) -> String {
    let mut key = path.to_string_lossy().into_owned();
    if MAIN_SEPARATOR != '/' {
        key = key.replace(MAIN_SEPARATOR, "/");
    }
    if is_dir && !key.ends_with('/') {
        key.push('/');
    }
    key
}
