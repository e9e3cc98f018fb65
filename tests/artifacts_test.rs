//! Tests for artifact discovery and relocation.

use bootstrap_runner::engine::ArtifactCollector;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Layout {
    _dir: TempDir,
    root: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("work")).unwrap();
        fs::create_dir_all(root.join("results")).unwrap();
        Self { _dir: dir, root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn collector(&self) -> ArtifactCollector {
        ArtifactCollector::new(
            self.path("output"),
            vec![self.path("work")],
            vec![self.path("results")],
        )
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn summary_is_copied_into_slug_dir() {
    let layout = Layout::new();
    layout.write("work/fittrack-summary.md", "# FitTrack");

    let collected = layout.collector().collect("fittrack").await.unwrap();

    let expected = layout.path("output/fittrack/BOOTSTRAP_SUMMARY.md");
    assert_eq!(collected.summary_path.as_deref(), Some(expected.as_path()));
    assert_eq!(read(&expected), "# FitTrack");
    // Copied, not moved.
    assert!(layout.path("work/fittrack-summary.md").exists());
}

#[tokio::test]
async fn summary_must_be_markdown() {
    let layout = Layout::new();
    layout.write("work/fittrack.txt", "not a summary");

    let collected = layout.collector().collect("fittrack").await.unwrap();
    assert!(collected.summary_path.is_none());
    assert!(collected.is_empty());
}

#[tokio::test]
async fn first_summary_by_name_wins() {
    let layout = Layout::new();
    layout.write("work/b-fittrack.md", "second");
    layout.write("work/a-fittrack.md", "first");

    let collected = layout.collector().collect("fittrack").await.unwrap();
    assert_eq!(read(&collected.summary_path.unwrap()), "first");
}

#[tokio::test]
async fn earlier_summary_dir_wins() {
    let layout = Layout::new();
    layout.write("primary/zz-fittrack.md", "primary");
    layout.write("work/aa-fittrack.md", "secondary");

    let collector = ArtifactCollector::new(
        layout.path("output"),
        vec![layout.path("primary"), layout.path("work")],
        vec![layout.path("results")],
    );
    let collected = collector.collect("fittrack").await.unwrap();
    assert_eq!(read(&collected.summary_path.unwrap()), "primary");
}

#[tokio::test]
async fn result_files_and_dirs_are_copied() {
    let layout = Layout::new();
    layout.write("results/fittrack-report.json", "{}");
    layout.write("results/fittrack-screens/home.png", "png");
    layout.write("results/fittrack-screens/nested/detail.png", "png2");
    layout.write("results/other-report.json", "ignored");

    let collected = layout.collector().collect("fittrack").await.unwrap();

    let results_dir = layout.path("output/fittrack/results");
    assert_eq!(collected.results_dir.as_deref(), Some(results_dir.as_path()));
    assert_eq!(collected.result_files.len(), 3);
    assert_eq!(read(&results_dir.join("fittrack-report.json")), "{}");
    assert_eq!(read(&results_dir.join("fittrack-screens/home.png")), "png");
    assert_eq!(
        read(&results_dir.join("fittrack-screens/nested/detail.png")),
        "png2"
    );
    assert!(!results_dir.join("other-report.json").exists());
    assert!(layout.path("results/fittrack-report.json").exists());
}

#[tokio::test]
async fn later_results_dir_wins_on_name_collision() {
    let layout = Layout::new();
    layout.write("results/fittrack.json", "first");
    layout.write("more-results/fittrack.json", "second");

    let collector = ArtifactCollector::new(
        layout.path("output"),
        vec![layout.path("work")],
        vec![layout.path("results"), layout.path("more-results")],
    );
    let collected = collector.collect("fittrack").await.unwrap();

    let target = layout.path("output/fittrack/results/fittrack.json");
    assert_eq!(collected.result_files, vec![target.clone()]);
    assert_eq!(read(&target), "second");
}

#[tokio::test]
async fn nothing_found_is_not_an_error() {
    let layout = Layout::new();
    let collected = layout.collector().collect("fittrack").await.unwrap();

    assert!(collected.is_empty());
    assert!(collected.results_dir.is_none());
    assert!(!layout.path("output/fittrack").exists());
}

#[tokio::test]
async fn missing_candidate_dirs_are_skipped() {
    let layout = Layout::new();
    layout.write("work/fittrack.md", "summary");

    let collector = ArtifactCollector::new(
        layout.path("output"),
        vec![layout.path("does-not-exist"), layout.path("work")],
        vec![layout.path("also-missing")],
    );
    let collected = collector.collect("fittrack").await.unwrap();
    assert!(collected.summary_path.is_some());
    assert!(collected.result_files.is_empty());
}

#[tokio::test]
async fn fallback_name_used_only_when_slug_matches_nothing() {
    let layout = Layout::new();
    layout.write("work/fittrack.md", "fixture summary");
    layout.write("results/fittrack-data.json", "fixture");

    let collector = layout.collector().with_fallback_name("fittrack");
    let collected = collector.collect("meal-planner").await.unwrap();

    // Stored under the item's own slug, not the fallback's.
    let summary = layout.path("output/meal-planner/BOOTSTRAP_SUMMARY.md");
    assert_eq!(collected.summary_path.as_deref(), Some(summary.as_path()));
    assert_eq!(read(&summary), "fixture summary");
    assert!(
        layout
            .path("output/meal-planner/results/fittrack-data.json")
            .exists()
    );
}

#[tokio::test]
async fn fallback_ignored_when_slug_matches() {
    let layout = Layout::new();
    layout.write("work/meal-planner.md", "own");
    layout.write("work/fittrack.md", "fixture");

    let collector = layout.collector().with_fallback_name("fittrack");
    let collected = collector.collect("meal-planner").await.unwrap();
    assert_eq!(read(&collected.summary_path.unwrap()), "own");
}

#[tokio::test]
async fn without_fallback_other_names_are_not_matched() {
    let layout = Layout::new();
    layout.write("work/fittrack.md", "fixture");

    let collected = layout.collector().collect("meal-planner").await.unwrap();
    assert!(collected.is_empty());
}

#[tokio::test]
async fn recollecting_overwrites_previous_copy() {
    let layout = Layout::new();
    layout.write("work/fittrack.md", "v1");
    let collector = layout.collector();
    collector.collect("fittrack").await.unwrap();

    layout.write("work/fittrack.md", "v2");
    let collected = collector.collect("fittrack").await.unwrap();
    assert_eq!(read(&collected.summary_path.unwrap()), "v2");
}

#[test]
fn slug_dir_is_under_output_root() {
    let collector = ArtifactCollector::new("out", Vec::new(), Vec::new());
    assert_eq!(collector.slug_dir("fittrack"), PathBuf::from("out/fittrack"));
    assert_eq!(collector.output_root(), Path::new("out"));
}
