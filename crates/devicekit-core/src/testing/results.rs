//! Streaming parser for test-marker output.
//!
//! Consumes one already-received log line at a time - it is meant to run
//! inside a process observer, so it never blocks. Six markers are
//! recognized anywhere in a line: `[PASS]`, `[SKIPPED]`, `[IGNORED]`,
//! `[INCONCLUSIVE]`, `[FAIL]`, and the terminal `Tests run: ` summary. The
//! skipped/ignored/inconclusive family all classify as skipped.

use serde::Serialize;

const SUMMARY_MARKER: &str = "Tests run: ";

/// How a matched line is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestEventKind {
    Passed,
    Skipped,
    Failed,
    /// The terminal totals line.
    Summary,
}

/// One classified log emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestEvent {
    pub kind: TestEventKind,
    /// The trimmed text from the marker to the end of the line.
    pub message: String,
}

/// Accumulated test names by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestRunSummary {
    pub passed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl TestRunSummary {
    pub fn total(&self) -> usize {
        self.passed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Classifies test markers out of a line-oriented log stream.
#[derive(Debug, Default)]
pub struct TestResultsParser {
    summary: TestRunSummary,
    completed: bool,
}

impl TestResultsParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one log line.
    ///
    /// On any marker match, `on_event` receives the trimmed marker-to-end
    /// text. On the summary marker only, `on_complete` additionally fires -
    /// exactly once across the whole stream, no matter how many summary
    /// lines arrive. Non-matching lines are ignored.
    pub fn parse_line(
        &mut self,
        line: &str,
        mut on_event: impl FnMut(TestEvent),
        mut on_complete: impl FnMut(),
    ) {
        const MARKERS: [(&str, TestEventKind); 5] = [
            ("[PASS]", TestEventKind::Passed),
            ("[SKIPPED]", TestEventKind::Skipped),
            ("[IGNORED]", TestEventKind::Skipped),
            ("[INCONCLUSIVE]", TestEventKind::Skipped),
            ("[FAIL]", TestEventKind::Failed),
        ];

        for (marker, kind) in MARKERS {
            let Some((message, name)) = match_marker(line, marker) else {
                continue;
            };
            match kind {
                TestEventKind::Passed => self.summary.passed.push(name),
                TestEventKind::Skipped => self.summary.skipped.push(name),
                TestEventKind::Failed => self.summary.failed.push(name),
                TestEventKind::Summary => {}
            }
            on_event(TestEvent { kind, message });
            return;
        }

        if let Some((message, _)) = match_marker(line, SUMMARY_MARKER) {
            on_event(TestEvent {
                kind: TestEventKind::Summary,
                message,
            });
            if !self.completed {
                self.completed = true;
                on_complete();
            }
        }
    }

    /// Whether the summary marker has been seen.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// The accumulated outcome lists.
    pub fn summary(&self) -> TestRunSummary {
        self.summary.clone()
    }
}

/// Finds `marker` anywhere in `line`, returning the trimmed marker-to-end
/// text and the trimmed remainder after the marker.
fn match_marker(line: &str, marker: &str) -> Option<(String, String)> {
    let index = line.find(marker)?;
    let message = line[index..].trim();
    if message.is_empty() {
        return None;
    }
    let name = line[index + marker.len()..].trim();
    Some((message.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut TestResultsParser, lines: &[&str]) -> (Vec<TestEvent>, usize) {
        let mut events = Vec::new();
        let mut completions = 0;
        for line in lines {
            parser.parse_line(line, |event| events.push(event), || completions += 1);
        }
        (events, completions)
    }

    #[test]
    fn classifies_pass_fail_and_summary() {
        let mut parser = TestResultsParser::new();
        let (events, completions) = feed(
            &mut parser,
            &["[PASS] testA", "[FAIL] testB", "Tests run: 2"],
        );

        let classified: Vec<&TestEvent> = events
            .iter()
            .filter(|e| e.kind != TestEventKind::Summary)
            .collect();
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].kind, TestEventKind::Passed);
        assert_eq!(classified[0].message, "[PASS] testA");
        assert_eq!(classified[1].kind, TestEventKind::Failed);
        assert_eq!(completions, 1);
        assert!(parser.is_complete());

        let summary = parser.summary();
        assert_eq!(summary.passed, vec!["testA"]);
        assert_eq!(summary.failed, vec!["testB"]);
        assert!(!summary.all_passed());
    }

    #[test]
    fn skipped_family_all_classify_as_skipped() {
        let mut parser = TestResultsParser::new();
        let (events, _) = feed(
            &mut parser,
            &[
                "[SKIPPED] testA",
                "[IGNORED] testB",
                "[INCONCLUSIVE] testC",
            ],
        );

        assert!(events.iter().all(|e| e.kind == TestEventKind::Skipped));
        assert_eq!(parser.summary().skipped, vec!["testA", "testB", "testC"]);
    }

    #[test]
    fn markers_match_anywhere_in_the_line() {
        let mut parser = TestResultsParser::new();
        let (events, _) = feed(
            &mut parser,
            &["05-11 10:22:33.444  1234  5678 I mono-stdout: [PASS] testA"],
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "[PASS] testA");
        assert_eq!(parser.summary().passed, vec!["testA"]);
    }

    #[test]
    fn non_matching_lines_are_ignored() {
        let mut parser = TestResultsParser::new();
        let (events, completions) = feed(
            &mut parser,
            &["plain log chatter", "", "Test run starting..."],
        );

        assert!(events.is_empty());
        assert_eq!(completions, 0);
        assert!(!parser.is_complete());
    }

    #[test]
    fn completion_fires_exactly_once() {
        let mut parser = TestResultsParser::new();
        let (events, completions) =
            feed(&mut parser, &["Tests run: 5", "Tests run: 5 again"]);

        assert_eq!(events.len(), 2);
        assert_eq!(completions, 1);
    }
}
