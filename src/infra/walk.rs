//! Filepath: src/infra/walk.rs
//! Gitignore-aware expansion of the target file glob.
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Extra ignore globs from config (early prune + late filter)
//! - Hidden files skipped unless opted in
//! - Deterministic ordering, so "first file with occurrences" is stable
//!
//! Backed by ripgrep's `ignore` crate and `globset`. Every path handed out
//! is relative to the workspace root; that is the form used in prompts, log
//! lines and burndown snapshots.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

/// Ignore globs applied when the config does not list its own.
pub const DEFAULT_IGNORES: &[&str] = &["target/**", "node_modules/**", "dist/**", "build/**", ".git/**"];

pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Include hidden (dot) files; default false
    include_hidden: bool,
}

impl Default for FileWalker
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: GlobSet::empty(),
            include_hidden: false,
        }
    }
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g., "target/**",
    /// "**/*.min.js"). Patterns match on workspace-relative paths.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern).with_context(|| format!("Invalid ignore pattern: {pattern}"))?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            include_hidden: false,
        })
    }

    /// Include or exclude hidden files (dotfiles).
    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // WalkBuilder::hidden(true) skips dotfiles
        b.hidden(!self.include_hidden);

        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);
        b.follow_links(false);

        // Early directory pruning on the relative path
        let extra = self
            .ignore_patterns
            .clone();
        let base = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .is_some_and(|ft| ft.is_dir());
            if !is_dir
            {
                return true;
            }

            let rel = ent
                .path()
                .strip_prefix(&base)
                .unwrap_or(ent.path());
            if rel
                .as_os_str()
                .is_empty()
            {
                return true;
            }
            // "target/**" should prune the "target" directory itself
            !(extra.is_match(rel) || extra.is_match(rel.join("_")))
        });

        b
    }

    /// Workspace-relative paths of every file under `root`, sorted.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            // Unreadable entries are dropped
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(root_path)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .filter(|rel| {
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort();

        out
    }

    /// Workspace-relative files under `root` matching `pattern`.
    ///
    /// `*` does not cross directory separators; use `**` for that.
    pub fn matching<P: AsRef<Path>>(
        &self,
        root: P,
        pattern: &str,
    ) -> Result<Vec<PathBuf>>
    {
        let matcher = compile_file_glob(pattern)?;
        Ok(self
            .walk_files(root)
            .into_iter()
            .filter(|rel| matcher.is_match(rel))
            .collect())
    }
}

/// Compile a user-supplied file glob.
pub fn compile_file_glob(pattern: &str) -> Result<GlobMatcher>
{
    let pattern = pattern
        .trim()
        .trim_start_matches("./");
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid file pattern: {pattern}"))?;
    Ok(glob.compile_matcher())
}
