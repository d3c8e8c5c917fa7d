//! Run reporters
//!
//! A [`Reporter`] receives the run lifecycle from [`crate::TestRunner`]:
//! `on_begin` once, `on_test_end` after every test, `on_end` once. Reporters
//! only produce output; nothing they do can change the run's outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use seedbed_common::{RunStatus, TestStatus};

use crate::factory::panic_message;

const RULE_WIDTH: usize = 70;
const FILE_RULE_WIDTH: usize = 66;

/// Identity of a test as declared by its author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    pub title: String,

    /// Source file the test was declared in
    pub file: String,
}

/// Result of the final attempt of one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub status: TestStatus,
    pub duration: Duration,
    pub error: Option<String>,

    /// Zero for the first attempt
    pub retry: u32,
}

/// Result of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub interrupted: usize,
    pub duration_ms: u64,
}

/// Observer of a test run
pub trait Reporter: Send {
    /// Called before the first test with the number of selected tests
    fn on_begin(&mut self, _planned: usize) {}

    fn on_test_end(&mut self, test: &TestInfo, outcome: &TestOutcome);

    fn on_end(&mut self, result: &RunResult);
}

/// One finished test as kept by the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub title: String,
    pub file: String,
    pub status: TestStatus,
    pub duration_ms: u64,
}

/// Tests of one source file, in completion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    pub file: String,
    pub tests: Vec<TestRecord>,
}

/// Aggregated view of the recorded tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files in the order their first test finished
    pub groups: Vec<FileGroup>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_records(records: &[TestRecord]) -> Self {
        let mut groups: Vec<FileGroup> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in records {
            let slot = *index.entry(record.file.as_str()).or_insert_with(|| {
                groups.push(FileGroup {
                    file: record.file.clone(),
                    tests: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].tests.push(record.clone());
        }

        let count = |status: TestStatus| records.iter().filter(|r| r.status == status).count();

        Self {
            groups,
            total: records.len(),
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
        }
    }
}

/// Prints a grouped, human-readable summary when the run ends
pub struct SummaryReporter {
    records: Vec<TestRecord>,
    started: Option<Instant>,
    out: Box<dyn Write + Send>,
}

impl Default for SummaryReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryReporter {
    /// Report to stdout
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            records: Vec::new(),
            started: None,
            out,
        }
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_records(&self.records)
    }
}

impl Reporter for SummaryReporter {
    fn on_begin(&mut self, _planned: usize) {
        self.records.clear();
        self.started = Some(Instant::now());
    }

    fn on_test_end(&mut self, test: &TestInfo, outcome: &TestOutcome) {
        self.records.push(TestRecord {
            title: test.title.clone(),
            file: short_path(&test.file),
            status: outcome.status,
            duration_ms: outcome.duration.as_millis() as u64,
        });
    }

    fn on_end(&mut self, result: &RunResult) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let summary = self.summary();

        let text = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            render(&summary, elapsed, result.status)
        })) {
            Ok(text) => text,
            Err(panic) => {
                error!("Summary rendering failed: {}", panic_message(panic.as_ref()));
                return;
            }
        };

        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Failed to write test summary: {}", e);
        }
    }
}

/// Render the summary block
pub fn render(summary: &RunSummary, elapsed: Duration, status: RunStatus) -> String {
    let rule = "═".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str("\n\n");
    out.push_str(&format!("{rule}\n"));
    out.push_str("  📊 TEST RESULTS SUMMARY\n");
    out.push_str(&format!("{rule}\n\n"));

    for group in &summary.groups {
        out.push_str(&format!("  📁 {}\n", group.file));
        out.push_str(&format!("  {}\n", "─".repeat(FILE_RULE_WIDTH)));

        for test in &group.tests {
            out.push_str(&format!("     {} {}\n", test.status.glyph(), test.title));
            out.push_str(&format!(
                "        Status: {}  |  Duration: {}\n",
                test.status.label(),
                format_duration(test.duration_ms)
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!("{rule}\n"));
    out.push_str("  📈 FINAL SUMMARY\n");
    out.push_str(&format!("{rule}\n\n"));
    out.push_str(&format!("     Total Tests:  {}\n", summary.total));
    out.push_str(&format!("     ✅ Passed:    {}\n", summary.passed));
    out.push_str(&format!("     ❌ Failed:    {}\n", summary.failed));
    out.push_str(&format!("     ⏭️  Skipped:   {}\n\n", summary.skipped));
    out.push_str(&format!(
        "     ⏱️  Total Time: {}\n",
        format_duration(elapsed.as_millis() as u64)
    ));
    out.push_str(&format!("     📋 Status:    {}\n\n", status));
    out.push_str(&format!("{rule}\n\n"));

    out
}

/// `850ms`, `12.35s`, `2m 5.0s`
pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        // Half-up rounding in whole centiseconds
        let centis = (ms + 5) / 10;
        format!("{}.{:02}s", centis / 100, centis % 100)
    } else {
        let minutes = ms / 60_000;
        let tenths = (ms % 60_000 + 50) / 100;
        format!("{minutes}m {}.{}s", tenths / 10, tenths % 10)
    }
}

/// Keep the last two path segments, e.g. `tests/auth/user.rs` -> `auth/user.rs`
pub fn short_path(file: &str) -> String {
    let normalized = file.replace('\\', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    parts[parts.len().saturating_sub(2)..].join("/")
}

/// Logs one line per finished test
#[derive(Debug, Default)]
pub struct ListReporter;

impl Reporter for ListReporter {
    fn on_begin(&mut self, planned: usize) {
        info!("Running {} test(s)...", planned);
    }

    fn on_test_end(&mut self, test: &TestInfo, outcome: &TestOutcome) {
        let duration = format_duration(outcome.duration.as_millis() as u64);
        match outcome.status {
            TestStatus::Passed => info!("✓ {} ({})", test.title, duration),
            TestStatus::Skipped => info!("- {} (skipped)", test.title),
            _ => error!(
                "✗ {} [{}] - {}",
                test.title,
                outcome.status.label(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    fn on_end(&mut self, result: &RunResult) {
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            result.passed,
            result.failed + result.timed_out,
            result.skipped,
            result.duration_ms
        );
    }
}

#[derive(Debug, Serialize)]
struct JsonTestEntry {
    #[serde(flatten)]
    record: TestRecord,
    error: Option<String>,
    retry: u32,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    result: &'a RunResult,
    tests: &'a [JsonTestEntry],
}

/// Writes `test-results.json` into an output directory when the run ends
pub struct JsonReporter {
    output_dir: PathBuf,
    entries: Vec<JsonTestEntry>,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join("test-results.json")
    }

    fn write(&self, result: &RunResult) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.path();
        let report = JsonReport {
            result,
            tests: &self.entries,
        };
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        Ok(path)
    }
}

impl Reporter for JsonReporter {
    fn on_begin(&mut self, _planned: usize) {
        self.entries.clear();
    }

    fn on_test_end(&mut self, test: &TestInfo, outcome: &TestOutcome) {
        self.entries.push(JsonTestEntry {
            record: TestRecord {
                title: test.title.clone(),
                file: test.file.clone(),
                status: outcome.status,
                duration_ms: outcome.duration.as_millis() as u64,
            },
            error: outcome.error.clone(),
            retry: outcome.retry,
        });
    }

    fn on_end(&mut self, result: &RunResult) {
        match self.write(result) {
            Ok(path) => info!("Results written to: {}", path.display()),
            Err(e) => warn!("Failed to write JSON results: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, "0ms")]
    #[test_case(999, "999ms")]
    #[test_case(1_000, "1.00s")]
    #[test_case(12_346, "12.35s")]
    #[test_case(59_999, "60.00s")]
    #[test_case(60_000, "1m 0.0s")]
    #[test_case(125_000, "2m 5.0s")]
    #[test_case(3_661_500, "61m 1.5s")]
    #[test_case(1_125, "1.13s")]
    #[test_case(2_625, "2.63s")]
    #[test_case(60_250, "1m 0.3s")]
    #[test_case(62_250, "1m 2.3s")]
    #[test_case(119_960, "1m 60.0s")]
    fn test_format_duration(ms: u64, expected: &str) {
        assert_eq!(format_duration(ms), expected);
    }

    #[test_case("/home/ci/app/e2e/tests/auth/user.spec.ts", "auth/user.spec.ts")]
    #[test_case("tests/smoke.rs", "tests/smoke.rs")]
    #[test_case("smoke.rs", "smoke.rs")]
    #[test_case("C:\\app\\tests\\smoke\\health.rs", "smoke/health.rs")]
    fn test_short_path(input: &str, expected: &str) {
        assert_eq!(short_path(input), expected);
    }

    fn record(title: &str, file: &str, status: TestStatus) -> TestRecord {
        TestRecord {
            title: title.to_string(),
            file: file.to_string(),
            status,
            duration_ms: 10,
        }
    }

    #[test]
    fn test_summary_counts_only_three_buckets() {
        let summary = RunSummary::from_records(&[
            record("a", "f", TestStatus::Passed),
            record("b", "f", TestStatus::TimedOut),
            record("c", "f", TestStatus::Interrupted),
            record("d", "f", TestStatus::Skipped),
        ]);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_render_empty_run() {
        let summary = RunSummary::from_records(&[]);
        let text = render(&summary, Duration::from_millis(5), RunStatus::Passed);
        assert!(text.contains("Total Tests:  0"));
        assert!(text.contains("Total Time: 5ms"));
        assert!(text.contains("Status:    PASSED"));
        assert!(!text.contains("📁"));
    }

    #[test]
    fn test_begin_resets_records() {
        let mut reporter = SummaryReporter::with_writer(Box::new(std::io::sink()));
        let info = TestInfo {
            title: "t".into(),
            file: "a/b/c.rs".into(),
        };
        let outcome = TestOutcome {
            status: TestStatus::Passed,
            duration: Duration::from_millis(3),
            error: None,
            retry: 0,
        };

        reporter.on_begin(1);
        reporter.on_test_end(&info, &outcome);
        assert_eq!(reporter.records().len(), 1);
        assert_eq!(reporter.records()[0].file, "b/c.rs");

        reporter.on_begin(0);
        assert!(reporter.records().is_empty());
    }

    #[test]
    fn test_json_reporter_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = JsonReporter::new(dir.path().join("out"));
        reporter.on_begin(1);
        reporter.on_test_end(
            &TestInfo {
                title: "creates user".into(),
                file: "tests/auth/user.rs".into(),
            },
            &TestOutcome {
                status: TestStatus::Failed,
                duration: Duration::from_millis(42),
                error: Some("boom".into()),
                retry: 1,
            },
        );
        reporter.on_end(&RunResult {
            status: RunStatus::Failed,
            passed: 0,
            failed: 1,
            skipped: 0,
            timed_out: 0,
            interrupted: 0,
            duration_ms: 50,
        });

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(reporter.path()).unwrap()).unwrap();
        assert_eq!(written["result"]["status"], "failed");
        assert_eq!(written["tests"][0]["title"], "creates user");
        assert_eq!(written["tests"][0]["status"], "failed");
        assert_eq!(written["tests"][0]["retry"], 1);
        assert_eq!(written["tests"][0]["error"], "boom");
    }
}
