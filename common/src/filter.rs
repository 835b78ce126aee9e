//! Include/exclude glob patterns applied while scanning the source tree
//!
//! Patterns are matched against paths relative to the source root.
//!
//! # Pattern Syntax
//!
//! - `*` matches anything except `/`
//! - `**` matches anything including `/`
//! - `?` matches a single character (except `/`)
//! - `[...]` character classes
//! - Leading `/` anchors the pattern to the source root
//! - Trailing `/` matches only directories
//!
//! Patterns without a `/` in the middle also match against the file name alone, so `*.xmp`
//! excludes sidecar files at any depth.
//!
//! # Examples
//!
//! ```
//! use common::filter::FilterSettings;
//! use std::path::Path;
//!
//! let mut filter = FilterSettings::default();
//! filter.add_exclude("*.tmp").unwrap();
//! filter.add_exclude(".thumbnails/").unwrap();
//!
//! assert!(!filter.includes_file(Path::new("DCIM/clip.tmp")));
//! assert!(filter.includes_file(Path::new("DCIM/clip.mov")));
//! assert!(!filter.includes_dir(Path::new("DCIM/.thumbnails")));
//! ```

use anyhow::{Context, anyhow};
use std::path::Path;

/// A single compiled include or exclude pattern
#[derive(Debug, Clone)]
pub struct FilterPattern {
    /// pattern as given by the user
    pub original: String,
    matcher: globset::GlobMatcher,
    /// pattern ends with `/`
    pub dir_only: bool,
    /// pattern starts with `/`
    pub anchored: bool,
    /// pattern has a separator between its markers and must match the full relative path
    path_pattern: bool,
}

impl FilterPattern {
    pub fn parse(pattern: &str) -> Result<Self, anyhow::Error> {
        let core = pattern.trim_start_matches('/').trim_end_matches('/');
        if core.is_empty() {
            return Err(anyhow!("filter pattern {:?} is empty", pattern));
        }
        let matcher = globset::GlobBuilder::new(core)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pattern}"))?
            .compile_matcher();
        Ok(Self {
            original: pattern.to_string(),
            matcher,
            dir_only: pattern.ends_with('/'),
            anchored: pattern.starts_with('/'),
            path_pattern: core.contains('/'),
        })
    }

    pub fn matches(&self, relative_path: &Path, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.matcher.is_match(relative_path) {
            return true;
        }
        if self.anchored || self.path_pattern {
            return false;
        }
        relative_path
            .file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }
}

/// Include/exclude rules for the scanner
///
/// Excludes are checked first and apply to both files and directories; an excluded directory is
/// not descended into. Includes apply to files only: when any include pattern is present a file
/// must match one of them to be copied.
#[derive(Debug, Clone, Default)]
pub struct FilterSettings {
    pub includes: Vec<FilterPattern>,
    pub excludes: Vec<FilterPattern>,
}

impl FilterSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_include(&mut self, pattern: &str) -> Result<(), anyhow::Error> {
        self.includes.push(FilterPattern::parse(pattern)?);
        Ok(())
    }

    pub fn add_exclude(&mut self, pattern: &str) -> Result<(), anyhow::Error> {
        self.excludes.push(FilterPattern::parse(pattern)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Returns the first exclude pattern matching the path, if any
    pub fn excluded_by(&self, relative_path: &Path, is_dir: bool) -> Option<&str> {
        self.excludes
            .iter()
            .find(|pattern| pattern.matches(relative_path, is_dir))
            .map(|pattern| pattern.original.as_str())
    }

    pub fn includes_dir(&self, relative_path: &Path) -> bool {
        self.excluded_by(relative_path, true).is_none()
    }

    pub fn includes_file(&self, relative_path: &Path) -> bool {
        if self.excluded_by(relative_path, false).is_some() {
            return false;
        }
        self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|pattern| pattern.matches(relative_path, false))
    }
}
