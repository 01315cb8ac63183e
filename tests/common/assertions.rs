//! Custom test assertions for integration tests

use std::path::Path;

use cdn_log_dl::RunSummary;

/// Parse the two counters out of a report's header block
///
/// Returns `(files_matched, total_lines)`.
pub fn report_counters(report: &str) -> (usize, usize) {
    let counter = |prefix: &str| {
        report
            .lines()
            .find_map(|line| line.strip_prefix(prefix))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or_else(|| panic!("report has no '{prefix}' line:\n{report}"))
    };
    (counter("# Files matched: "), counter("# Total matching lines: "))
}

/// Assert the report on disk agrees with the run summary
pub fn assert_report_matches_summary(summary: &RunSummary) {
    let report = read_report(&summary.report_path);
    assert_eq!(
        report_counters(&report),
        (summary.files_matched, summary.total_lines),
        "report header disagrees with run summary"
    );

    let section_total: usize = report
        .lines()
        .filter_map(|line| line.strip_prefix("Matching lines: "))
        .map(|n| n.parse::<usize>().expect("numeric section count"))
        .sum();
    assert_eq!(section_total, summary.total_lines, "section counts disagree with header");
}

/// Read a report, panicking with context if it is missing
pub fn read_report(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read report {}: {}", path.display(), e))
}
