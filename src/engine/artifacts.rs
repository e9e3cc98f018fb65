//! Artifact collection: find what the build left behind for a slug and
//! copy it into the per-slug output layout.
//!
//! ```text
//! <output_root>/<slug>/BOOTSTRAP_SUMMARY.md
//! <output_root>/<slug>/results/...
//! ```
//!
//! A file or directory belongs to a slug when its name contains the slug.
//! Sources are copied, never moved.

use crate::config::ArtifactSettings;
use crate::error::Result;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the relocated summary document.
pub const SUMMARY_FILE_NAME: &str = "BOOTSTRAP_SUMMARY.md";

/// Subdirectory of the slug directory that holds result files.
pub const RESULTS_DIR_NAME: &str = "results";

/// Where a slug's artifacts ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedArtifacts {
    pub summary_path: Option<PathBuf>,
    /// `<output_root>/<slug>/results`, set when any result was copied.
    pub results_dir: Option<PathBuf>,
    pub result_files: Vec<PathBuf>,
}

impl CollectedArtifacts {
    pub fn is_empty(&self) -> bool {
        self.summary_path.is_none() && self.result_files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    output_root: PathBuf,
    summary_dirs: Vec<PathBuf>,
    results_dirs: Vec<PathBuf>,
    fallback_name: Option<String>,
}

impl ArtifactCollector {
    pub fn new(
        output_root: impl Into<PathBuf>,
        summary_dirs: Vec<PathBuf>,
        results_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            summary_dirs,
            results_dirs,
            fallback_name: None,
        }
    }

    pub fn from_settings(settings: &ArtifactSettings) -> Self {
        Self::new(
            settings.output_root.clone(),
            settings.summary_dirs.clone(),
            settings.results_dirs.clone(),
        )
    }

    /// Match artifacts named after `name` when nothing matches the slug.
    ///
    /// Only meant for synthetic runs against a fixed fixture; the
    /// scheduler never sets it.
    pub fn with_fallback_name(mut self, name: impl Into<String>) -> Self {
        self.fallback_name = Some(name.into());
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<output_root>/<slug>`.
    pub fn slug_dir(&self, slug: &str) -> PathBuf {
        self.output_root.join(slug)
    }

    /// Locate and copy the artifacts for `slug`.
    ///
    /// Finding nothing is not an error. Only I/O failures while copying are.
    pub async fn collect(&self, slug: &str) -> Result<CollectedArtifacts> {
        let mut summary = self.find_summary(slug).await;
        let mut results = self.find_results(slug).await;

        if summary.is_none() && results.is_empty() {
            if let Some(fallback) = &self.fallback_name {
                warn!(slug, fallback = %fallback, "no artifacts match slug, using fallback name");
                summary = self.find_summary(fallback).await;
                results = self.find_results(fallback).await;
            }
        }

        let slug_dir = self.slug_dir(slug);
        let mut collected = CollectedArtifacts::default();

        match summary {
            Some(source) => {
                tokio::fs::create_dir_all(&slug_dir).await?;
                let target = slug_dir.join(SUMMARY_FILE_NAME);
                tokio::fs::copy(&source, &target).await?;
                info!(
                    slug,
                    from = %source.display(),
                    to = %target.display(),
                    "summary collected"
                );
                collected.summary_path = Some(target);
            }
            None => info!(slug, "no summary document found"),
        }

        if results.is_empty() {
            info!(slug, "no result files found");
        } else {
            let results_dir = slug_dir.join(RESULTS_DIR_NAME);
            tokio::fs::create_dir_all(&results_dir).await?;
            let mut names = HashSet::new();
            for source in results {
                let Some(name) = source.file_name() else {
                    continue;
                };
                if !names.insert(name.to_os_string()) {
                    warn!(
                        slug,
                        from = %source.display(),
                        "result name already collected from an earlier directory, overwriting"
                    );
                }
                let target = results_dir.join(name);
                if tokio::fs::metadata(&source).await?.is_dir() {
                    copy_dir(&source, &target, &mut collected.result_files).await?;
                } else {
                    tokio::fs::copy(&source, &target).await?;
                    collected.result_files.push(target);
                }
            }
            collected.result_files.sort();
            collected.result_files.dedup();
            info!(slug, files = collected.result_files.len(), "result files collected");
            collected.results_dir = Some(results_dir);
        }

        Ok(collected)
    }

    /// First `.md` file whose name contains `name`, by directory order then
    /// file name.
    async fn find_summary(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.summary_dirs {
            let found = matching_entries(dir, name)
                .await
                .into_iter()
                .find(|(path, is_dir)| {
                    !is_dir
                        && path
                            .extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
                });
            if let Some((path, _)) = found {
                return Some(path);
            }
        }
        None
    }

    async fn find_results(&self, name: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.results_dirs {
            found.extend(
                matching_entries(dir, name)
                    .await
                    .into_iter()
                    .map(|(path, _)| path),
            );
        }
        found
    }
}

/// Entries of `dir` whose file name contains `needle`, sorted by name.
///
/// A missing or unreadable directory yields nothing.
async fn matching_entries(dir: &Path, needle: &str) -> Vec<(PathBuf, bool)> {
    if needle.is_empty() {
        return Vec::new();
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "candidate directory missing");
            return Vec::new();
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read candidate directory");
            return Vec::new();
        }
    };

    let mut matches = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if !entry.file_name().to_string_lossy().contains(needle) {
                    continue;
                }
                let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                matches.push((entry.path(), is_dir));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "error listing candidate directory");
                break;
            }
        }
    }
    matches.sort();
    matches
}

/// Recursively copy `source` into `target`, recording every copied file.
async fn copy_dir(source: &Path, target: &Path, copied: &mut Vec<PathBuf>) -> Result<()> {
    let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let dest = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), dest));
            } else {
                files.push((entry.path(), dest));
            }
        }
        files.sort();
        for (file, dest) in files {
            tokio::fs::copy(&file, &dest).await?;
            copied.push(dest);
        }
    }

    Ok(())
}
