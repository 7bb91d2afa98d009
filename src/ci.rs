//! CI status monitoring for a pull request.
//!
//! Polls `gh pr checks` with an initial quiet delay so jobs can register,
//! an isolated per-command timeout so a hung `gh` cannot eat the overall
//! budget, and a classification that accepts both symbolic and textual
//! status markers. Any pending line makes the whole result pending, which
//! prevents premature remediation.

use std::time::Duration;

use camino::Utf8PathBuf;
use regex::Regex;

use crate::config::CiConfig;
use crate::error::CiError;
use crate::gh::GhOps;
use crate::types::{CiResult, CiStatus};

/// Options for one CI wait.
#[derive(Debug, Clone, Default)]
pub struct CheckCiOptions {
    /// Regex over failed-job names; matches are treated as non-blocking.
    pub e2e_ignore_pattern: Option<String>,
}

pub struct CiMonitor {
    gh: GhOps,
    working_dir: Utf8PathBuf,
    initial_delay: Duration,
    check_interval: Duration,
}

impl CiMonitor {
    #[must_use]
    pub fn new(gh: GhOps, working_dir: Utf8PathBuf, config: &CiConfig) -> Self {
        // The per-command timeout lives on the GhOps passed in; callers
        // construct it from the same CiConfig.
        Self {
            gh,
            working_dir,
            initial_delay: config.initial_delay,
            check_interval: config.check_interval,
        }
    }

    /// One CI status poll.
    pub async fn check_ci(&self, pr_number: u64) -> Result<CiResult, CiError> {
        let output = self
            .gh
            .pr_checks(&self.working_dir, pr_number)
            .await
            .map_err(|e| CiError::CheckFailed {
                reason: e.to_string(),
            })?;

        // gh exits non-zero for pending (8) and failing checks; stdout still
        // carries the table. Only a missing table is an error.
        if output.stdout.is_empty() && !output.stderr.is_empty() && output.exit_code != 0 {
            // No checks reported yet is a pending verdict, not a failure.
            if output.stderr.contains("no checks") {
                return Ok(CiResult {
                    passed: false,
                    status: CiStatus::Pending,
                    failed_jobs: Vec::new(),
                    output: String::new(),
                });
            }
            return Err(CiError::CheckFailed {
                reason: output.stderr,
            });
        }

        let (status, failed_jobs) = parse_ci_output(&output.stdout);
        Ok(CiResult {
            passed: status == CiStatus::Success,
            status,
            failed_jobs,
            output: output.stdout,
        })
    }

    /// Wait until CI settles or the overall timeout expires.
    pub async fn wait_for_ci(
        &self,
        pr_number: u64,
        overall_timeout: Duration,
    ) -> Result<CiResult, CiError> {
        self.wait_for_ci_with_options(pr_number, overall_timeout, CheckCiOptions::default())
            .await
    }

    pub async fn wait_for_ci_with_options(
        &self,
        pr_number: u64,
        overall_timeout: Duration,
        options: CheckCiOptions,
    ) -> Result<CiResult, CiError> {
        self.wait_for_ci_with_progress(pr_number, overall_timeout, options, &|_| {})
            .await
    }

    /// Wait with a progress callback receiving one line per poll.
    pub async fn wait_for_ci_with_progress(
        &self,
        pr_number: u64,
        overall_timeout: Duration,
        options: CheckCiOptions,
        on_progress: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<CiResult, CiError> {
        let wait_loop = async {
            on_progress(&format!(
                "waiting {}s for CI jobs to register",
                self.initial_delay.as_secs()
            ));
            tokio::time::sleep(self.initial_delay).await;

            loop {
                let result = self.check_ci(pr_number).await?;
                match result.status {
                    CiStatus::Pending => {
                        on_progress("CI pending");
                        tokio::time::sleep(self.check_interval).await;
                    }
                    CiStatus::Success => {
                        on_progress("CI passed");
                        return Ok(result);
                    }
                    CiStatus::Failure => {
                        let filtered = match &options.e2e_ignore_pattern {
                            Some(pattern) => filter_e2e_failures(result, pattern),
                            None => result,
                        };
                        if filtered.passed {
                            on_progress("CI failures all matched the ignore pattern");
                        } else {
                            on_progress(&format!(
                                "CI failed: {}",
                                filtered.failed_jobs.join(", ")
                            ));
                        }
                        return Ok(filtered);
                    }
                }
            }
        };

        match tokio::time::timeout(overall_timeout, wait_loop).await {
            Ok(result) => result,
            Err(_) => Err(CiError::Timeout {
                timeout_seconds: overall_timeout.as_secs(),
            }),
        }
    }
}

/// Classify `gh pr checks` output.
///
/// Lines are tab-separated (`name<TAB>status<TAB>...`) or symbol-prefixed
/// (`✓ name`). Pending dominates: one pending line makes the whole result
/// pending. Empty output is pending.
#[must_use]
pub fn parse_ci_output(output: &str) -> (CiStatus, Vec<String>) {
    let mut any_pending = false;
    let mut failed_jobs = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (name, marker) = if line.contains('\t') {
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default().trim();
            let marker = fields.next().unwrap_or_default().trim();
            (name, marker)
        } else {
            let mut tokens = line.split_whitespace();
            let marker = tokens.next().unwrap_or_default();
            let name = line[marker.len()..].trim();
            (name, marker)
        };

        match classify_marker(marker) {
            Some(LineStatus::Pass) => {}
            Some(LineStatus::Fail) => failed_jobs.push(name.to_string()),
            Some(LineStatus::Pending) => any_pending = true,
            None => {}
        }
    }

    let status = if output.trim().is_empty() || any_pending {
        CiStatus::Pending
    } else if failed_jobs.is_empty() {
        CiStatus::Success
    } else {
        CiStatus::Failure
    };
    (status, failed_jobs)
}

enum LineStatus {
    Pass,
    Fail,
    Pending,
}

fn classify_marker(marker: &str) -> Option<LineStatus> {
    match marker {
        "✓" | "pass" | "success" => Some(LineStatus::Pass),
        "✗" | "fail" | "failure" => Some(LineStatus::Fail),
        "○" | "*" | "pending" | "queued" | "in_progress" => Some(LineStatus::Pending),
        _ => None,
    }
}

/// Remove failed jobs matching the ignore pattern. If that empties the
/// list, `passed` flips to true while `status` stays `failure` so callers
/// can tell real CI said failure but nothing actionable remained. An
/// invalid pattern makes the filter a no-op.
#[must_use]
pub fn filter_e2e_failures(result: CiResult, pattern: &str) -> CiResult {
    if result.failed_jobs.is_empty() || pattern.is_empty() {
        return result;
    }
    let Ok(re) = Regex::new(pattern) else {
        tracing::warn!(pattern = %pattern, "invalid E2E ignore pattern, filter disabled");
        return result;
    };

    let remaining: Vec<String> = result
        .failed_jobs
        .iter()
        .filter(|job| !re.is_match(job))
        .cloned()
        .collect();

    let passed = remaining.is_empty() && result.status == CiStatus::Failure || result.passed;
    CiResult {
        passed,
        status: result.status,
        failed_jobs: remaining,
        output: result.output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_is_pending() {
        let (status, failed) = parse_ci_output("");
        assert_eq!(status, CiStatus::Pending);
        assert!(failed.is_empty());
    }

    #[test]
    fn all_checks_passed() {
        let (status, failed) = parse_ci_output("✓ build\n✓ test\n✓ lint");
        assert_eq!(status, CiStatus::Success);
        assert!(failed.is_empty());
    }

    #[test]
    fn some_checks_failed() {
        let (status, failed) = parse_ci_output("✓ build\n✗ test\n✓ lint");
        assert_eq!(status, CiStatus::Failure);
        assert_eq!(failed, vec!["test".to_string()]);
    }

    #[test]
    fn pending_dominates_failure() {
        let (status, failed) = parse_ci_output("✓ build\n✗ test\n○ lint");
        assert_eq!(status, CiStatus::Pending);
        assert_eq!(failed, vec!["test".to_string()]);
    }

    #[test]
    fn multiple_failed_jobs_keep_order() {
        let (status, failed) =
            parse_ci_output("✓ build\n✗ test-unit\n✗ test-integration\n✓ lint");
        assert_eq!(status, CiStatus::Failure);
        assert_eq!(
            failed,
            vec!["test-unit".to_string(), "test-integration".to_string()]
        );
    }

    #[test]
    fn tab_separated_textual_markers() {
        let output = "Vercel Preview Comments\tpass\t0\thttps://vercel.com/github\n\
            Test gateway / Lint gateway\tpending\t0\thttps://github.com/example/actions/runs/123\n\
            Test gateway / Test gateway\tpending\t0\thttps://github.com/example/actions/runs/123\n\
            Vercel\tpass\t0\thttps://vercel.com/example\tDeployment has completed";
        let (status, failed) = parse_ci_output(output);
        assert_eq!(status, CiStatus::Pending);
        assert!(failed.is_empty());
    }

    #[test]
    fn tab_separated_failure_keeps_full_name() {
        let (status, failed) = parse_ci_output("Test gateway / e2e-browser\tfail\t30\turl");
        assert_eq!(status, CiStatus::Failure);
        assert_eq!(failed, vec!["Test gateway / e2e-browser".to_string()]);
    }

    #[test]
    fn unknown_markers_are_neutral() {
        let (status, failed) = parse_ci_output("### header line\n✓ build");
        assert_eq!(status, CiStatus::Success);
        assert!(failed.is_empty());
    }

    fn failure(jobs: &[&str]) -> CiResult {
        CiResult {
            passed: false,
            status: CiStatus::Failure,
            failed_jobs: jobs.iter().map(|s| s.to_string()).collect(),
            output: "output".to_string(),
        }
    }

    #[test]
    fn filter_noop_without_failures() {
        let result = CiResult {
            passed: true,
            status: CiStatus::Success,
            failed_jobs: vec![],
            output: "all passed".to_string(),
        };
        let filtered = filter_e2e_failures(result.clone(), "e2e|E2E");
        assert_eq!(filtered, result);
    }

    #[test]
    fn filter_all_matches_flips_passed() {
        let filtered = filter_e2e_failures(failure(&["test-e2e", "integration-test"]), "e2e|integration");
        assert!(filtered.passed);
        assert_eq!(filtered.status, CiStatus::Failure);
        assert!(filtered.failed_jobs.is_empty());
    }

    #[test]
    fn filter_mixed_keeps_real_failures() {
        let filtered = filter_e2e_failures(failure(&["test-unit", "test-e2e", "lint"]), "e2e|E2E");
        assert!(!filtered.passed);
        assert_eq!(
            filtered.failed_jobs,
            vec!["test-unit".to_string(), "lint".to_string()]
        );
    }

    #[test]
    fn filter_case_insensitive_pattern() {
        let filtered = filter_e2e_failures(failure(&["test-E2E"]), "(?i)e2e");
        assert!(filtered.passed);
        assert!(filtered.failed_jobs.is_empty());
    }

    #[test]
    fn invalid_pattern_is_noop() {
        let original = failure(&["test-unit"]);
        let filtered = filter_e2e_failures(original.clone(), "(unclosed");
        assert_eq!(filtered, original);
    }

    mod wait {
        use super::*;
        use crate::command::{CommandOutput, CommandRunner, CommandSpec};
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        /// Runner whose `gh pr checks` answer changes per poll.
        struct SequenceRunner {
            responses: Vec<&'static str>,
            index: AtomicUsize,
        }

        #[async_trait]
        impl CommandRunner for SequenceRunner {
            async fn run(
                &self,
                _spec: &CommandSpec,
                _timeout: Duration,
            ) -> Result<CommandOutput, crate::error::CommandError> {
                let i = self.index.fetch_add(1, Ordering::SeqCst);
                let stdout = self.responses[i.min(self.responses.len() - 1)];
                Ok(CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            }
        }

        fn monitor(responses: Vec<&'static str>) -> CiMonitor {
            let runner = Arc::new(SequenceRunner {
                responses,
                index: AtomicUsize::new(0),
            });
            let config = CiConfig {
                initial_delay: Duration::from_millis(10),
                check_interval: Duration::from_millis(10),
                ..CiConfig::default()
            };
            CiMonitor::new(
                GhOps::new(runner),
                Utf8PathBuf::from("/test/worktree"),
                &config,
            )
        }

        #[tokio::test]
        async fn waits_through_pending_to_success() {
            let m = monitor(vec!["○ build", "○ build", "✓ build\n✓ test"]);
            let result = m.wait_for_ci(9, Duration::from_secs(5)).await.unwrap();
            assert!(result.passed);
            assert_eq!(result.status, CiStatus::Success);
        }

        #[tokio::test]
        async fn failure_returns_failed_jobs() {
            let m = monitor(vec!["✗ lint\n✓ unit"]);
            let result = m.wait_for_ci(7, Duration::from_secs(5)).await.unwrap();
            assert!(!result.passed);
            assert_eq!(result.failed_jobs, vec!["lint".to_string()]);
        }

        #[tokio::test]
        async fn ignored_e2e_flake_passes() {
            let m = monitor(vec!["✗ e2e-browser\n✓ unit\n✓ lint"]);
            let result = m
                .wait_for_ci_with_options(
                    9,
                    Duration::from_secs(5),
                    CheckCiOptions {
                        e2e_ignore_pattern: Some("(?i)e2e".to_string()),
                    },
                )
                .await
                .unwrap();
            assert!(result.passed);
            assert_eq!(result.status, CiStatus::Failure);
            assert!(result.failed_jobs.is_empty());
        }

        #[tokio::test]
        async fn overall_timeout_expires() {
            let m = monitor(vec!["○ build"]);
            let err = m
                .wait_for_ci(9, Duration::from_millis(80))
                .await
                .unwrap_err();
            assert!(matches!(err, CiError::Timeout { .. }));
        }
    }
}
