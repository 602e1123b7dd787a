//! Keyword-bucket summarizer used when the inference service is unavailable
//! or returns something unusable.

use regex::RegexSet;

use super::types::{MAX_ACTIONS, MAX_ERRORS, MAX_FINDINGS, MAX_RECOMMENDATIONS, SummaryStatus};

const MIN_LINE_CHARS: usize = 10;
const MAX_LINE_CHARS: usize = 200;
const KEPT_LINE_CHARS: usize = 150;

pub const NO_FINDINGS: &str = "No specific findings extracted";
pub const DEFAULT_ACTION: &str = "Agent executed recipe";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bucket {
    Errors,
    Findings,
    Actions,
    Recommendations,
}

const BUCKETS: [(Bucket, &str); 4] = [
    (Bucket::Errors, r"(?i)error|failed|exception"),
    (Bucket::Findings, r"(?i)found|detected|identified"),
    (Bucket::Actions, r"(?i)running|checking|analyzing"),
    (Bucket::Recommendations, r"(?i)recommend|suggest|should|consider"),
];

const SUCCESS_MARKERS: [&str; 2] = ["Mission Complete", "completed successfully"];
const FAILURE_MARKERS: [&str; 2] = ["Process failed", "Fatal Error"];

/// Lists and verdict extracted from a log body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicSummary {
    pub status: SummaryStatus,
    pub key_findings: Vec<String>,
    pub actions: Vec<String>,
    pub recommendations: Vec<String>,
    pub errors: Vec<String>,
}

/// Compiled keyword buckets.
pub struct HeuristicSummarizer {
    patterns: RegexSet,
    buckets: Vec<Bucket>,
}

impl Default for HeuristicSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicSummarizer {
    pub fn new() -> Self {
        let (buckets, regexes): (Vec<_>, Vec<_>) = BUCKETS.iter().copied().unzip();
        // The patterns are fixed literals; failure here is a programming error.
        let patterns = RegexSet::new(regexes).unwrap_or_else(|_| RegexSet::empty());
        Self { patterns, buckets }
    }

    /// Scan a log body line by line. A line may land in several buckets.
    pub fn summarize(&self, body: &str) -> HeuristicSummary {
        let mut errors = Vec::new();
        let mut findings = Vec::new();
        let mut actions = Vec::new();
        let mut recommendations = Vec::new();

        for line in body.lines().map(str::trim) {
            let len = line.chars().count();
            if len <= MIN_LINE_CHARS || len >= MAX_LINE_CHARS {
                continue;
            }
            let kept: String = line.chars().take(KEPT_LINE_CHARS).collect();

            for index in self.patterns.matches(line).into_iter() {
                let (list, cap) = match self.buckets[index] {
                    Bucket::Errors => (&mut errors, MAX_ERRORS),
                    Bucket::Findings => (&mut findings, MAX_FINDINGS),
                    Bucket::Actions => (&mut actions, MAX_ACTIONS),
                    Bucket::Recommendations => (&mut recommendations, MAX_RECOMMENDATIONS),
                };
                if list.len() < cap {
                    list.push(kept.clone());
                }
            }
        }

        let status = verdict(body, errors.len());

        if findings.is_empty() {
            findings.push(NO_FINDINGS.to_string());
        }
        if actions.is_empty() {
            actions.push(DEFAULT_ACTION.to_string());
        }

        HeuristicSummary {
            status,
            key_findings: findings,
            actions,
            recommendations,
            errors,
        }
    }
}

/// Error-count verdict, then explicit completion markers override it.
fn verdict(body: &str, error_count: usize) -> SummaryStatus {
    let mut status = match error_count {
        0 => SummaryStatus::Success,
        1..=2 => SummaryStatus::Partial,
        _ => SummaryStatus::Failure,
    };

    if SUCCESS_MARKERS.iter().any(|m| body.contains(m)) {
        status = if error_count == 0 {
            SummaryStatus::Success
        } else {
            SummaryStatus::Partial
        };
    }
    if FAILURE_MARKERS.iter().any(|m| body.contains(m)) {
        status = SummaryStatus::Failure;
    }
    status
}
