// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing and adjudication of raw test-case results.
//!
//! A test case declares its own outcome by writing a single-line result
//! file. That declaration is only half the story: the kernel-reported
//! termination status must agree with it, and [`reconcile`] encodes the
//! full table of consistency rules. Disagreements are classified as
//! [`RawResult::Broken`] because a test that cannot report its own outcome
//! coherently cannot be trusted about anything else.
//!
//! The parser is deliberately total: malformed test-authored input never
//! surfaces as an error to the engine, it becomes a broken result with a
//! descriptive reason.

use crate::model::{ExitStatus, TestResult};
use camino::Utf8Path;
use std::fmt;

/// Magic separator used when flattening a multi-line result file into a
/// single diagnostic string.
const NEWLINE_MARKER: &str = "<<NEWLINE>>";

/// The finely typed outcome declared by a test case, before reconciliation
/// against the child's termination status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawResult {
    /// The test did not behave as it declared; carries the evidence.
    Broken(String),
    /// The test expected to die abruptly.
    ExpectedDeath(String),
    /// The test expected to exit with the given code; `None` accepts any
    /// clean exit.
    ExpectedExit(Option<i32>, String),
    /// The test expected to fail.
    ExpectedFailure(String),
    /// The test expected to be killed by the given signal; `None` accepts
    /// any signal.
    ExpectedSignal(Option<i32>, String),
    /// The test expected to run past its deadline.
    ExpectedTimeout(String),
    /// The test failed.
    Failed(String),
    /// The test passed.
    Passed,
    /// The test skipped itself.
    Skipped(String),
}

impl RawResult {
    /// Maps the internal taxonomy onto the caller-visible one, coalescing
    /// every `Expected*` variant into an expected failure. This is the only
    /// place where that coalescing happens.
    pub fn externalize(&self) -> TestResult {
        match self {
            RawResult::Passed => TestResult::Passed,
            RawResult::Failed(reason) => TestResult::Failed(reason.clone()),
            RawResult::Skipped(reason) => TestResult::Skipped(reason.clone()),
            RawResult::Broken(reason) => TestResult::Broken(reason.clone()),
            RawResult::ExpectedDeath(reason)
            | RawResult::ExpectedExit(_, reason)
            | RawResult::ExpectedFailure(reason)
            | RawResult::ExpectedSignal(_, reason)
            | RawResult::ExpectedTimeout(reason) => TestResult::ExpectedFailure(reason.clone()),
        }
    }
}

impl fmt::Display for RawResult {
    /// Renders the result in the result-file grammar, such that
    /// `parse(format!("{r}\n"))` round-trips for well-formed results.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RawResult::Broken(reason) => write!(f, "broken: {reason}"),
            RawResult::ExpectedDeath(reason) => write!(f, "expected_death: {reason}"),
            RawResult::ExpectedExit(None, reason) => write!(f, "expected_exit: {reason}"),
            RawResult::ExpectedExit(Some(code), reason) => {
                write!(f, "expected_exit({code}): {reason}")
            }
            RawResult::ExpectedFailure(reason) => write!(f, "expected_failure: {reason}"),
            RawResult::ExpectedSignal(None, reason) => write!(f, "expected_signal: {reason}"),
            RawResult::ExpectedSignal(Some(signo), reason) => {
                write!(f, "expected_signal({signo}): {reason}")
            }
            RawResult::ExpectedTimeout(reason) => write!(f, "expected_timeout: {reason}"),
            RawResult::Failed(reason) => write!(f, "failed: {reason}"),
            RawResult::Passed => f.write_str("passed"),
            RawResult::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// Flattens the input into `(line count, merged contents)`.
///
/// A trailing fragment with no newline does not count as a line when it is
/// the only content, which is how "no final newline" collapses into the
/// empty-result error. Extra lines are merged with a literal
/// `<<NEWLINE>>` marker so the diagnostic can show them all.
fn read_lines(input: &str) -> (usize, String) {
    let mut count = 0;
    let mut flat = String::new();
    let mut rest = input;

    loop {
        match rest.find('\n') {
            Some(pos) => {
                let line = &rest[..pos];
                rest = &rest[pos + 1..];
                if count == 0 {
                    flat.push_str(line);
                } else {
                    flat.push_str(NEWLINE_MARKER);
                    flat.push_str(line);
                }
                count += 1;
            }
            None => {
                if !rest.is_empty() {
                    if count == 0 {
                        flat.push_str(rest);
                    } else {
                        flat.push_str(NEWLINE_MARKER);
                        flat.push_str(rest);
                        count += 1;
                    }
                }
                break;
            }
        }
    }

    (count, flat)
}

/// Parses a status that takes no reason. Only `passed` qualifies.
fn parse_without_reason(status: &str, rest: &str) -> RawResult {
    debug_assert_eq!(status, "passed");
    if !rest.is_empty() {
        return RawResult::Broken(format!("{status} cannot have a reason"));
    }
    RawResult::Passed
}

/// Parses a status that requires a `': <reason>'` suffix.
fn parse_with_reason(status: &str, rest: &str) -> RawResult {
    if rest.len() < 3 || !rest.starts_with(": ") {
        return RawResult::Broken(format!("{status} must be followed by ': <reason>'"));
    }
    let reason = rest[2..].to_owned();

    match status {
        "broken" => RawResult::Broken(reason),
        "expected_death" => RawResult::ExpectedDeath(reason),
        "expected_failure" => RawResult::ExpectedFailure(reason),
        "expected_timeout" => RawResult::ExpectedTimeout(reason),
        "failed" => RawResult::Failed(reason),
        "skipped" => RawResult::Skipped(reason),
        _ => unreachable!("unexpected status"),
    }
}

/// Parses a status that requires a reason and accepts an optional integer
/// argument in parentheses.
fn parse_with_reason_and_arg(status: &str, rest: &str) -> RawResult {
    let invalid_format = || {
        RawResult::Broken(format!(
            "Invalid format for '{status}' test case result; must be followed by \
             '[(num)]: <reason>' but found '{rest}'"
        ))
    };

    let Some(delim) = rest.find([':', '(']) else {
        return invalid_format();
    };

    let (arg, reason_at) = if rest.as_bytes()[delim] == b'(' {
        let Some(close) = rest[delim..].find("):").map(|pos| delim + pos) else {
            return invalid_format();
        };
        let argstr = &rest[delim + 1..close];
        match argstr.parse::<i32>() {
            Ok(value) => (Some(value), close + 1),
            Err(_) => {
                return RawResult::Broken(format!(
                    "Invalid integer argument '{argstr}' to '{status}' test case result"
                ));
            }
        }
    } else {
        (None, delim)
    };

    let reason = rest.get(reason_at + 2..).unwrap_or("").to_owned();

    match status {
        "expected_exit" => RawResult::ExpectedExit(arg, reason),
        "expected_signal" => RawResult::ExpectedSignal(arg, reason),
        _ => unreachable!("unexpected status"),
    }
}

/// Parses the contents of a result file.
///
/// Never fails: malformed input produces [`RawResult::Broken`] with a
/// reason describing the problem.
pub fn parse(input: &str) -> RawResult {
    let (count, flat) = read_lines(input);
    if count == 0 {
        return RawResult::Broken("Empty test result or no new line".to_owned());
    }
    if count > 1 {
        return RawResult::Broken(format!("Test result contains multiple lines: {flat}"));
    }

    let delim = flat
        .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
        .unwrap_or(flat.len());
    let (status, rest) = flat.split_at(delim);

    match status {
        "passed" => parse_without_reason(status, rest),
        "broken" | "expected_death" | "expected_failure" | "expected_timeout" | "failed"
        | "skipped" => parse_with_reason(status, rest),
        "expected_exit" | "expected_signal" => parse_with_reason_and_arg(status, rest),
        _ => RawResult::Broken(format!("Unknown test result '{status}'")),
    }
}

/// Loads a result from a file.
///
/// Follows the same contract as [`parse`]: an unreadable file becomes a
/// broken result rather than an I/O error.
pub fn load(file: &Utf8Path) -> RawResult {
    match std::fs::read_to_string(file) {
        Ok(contents) => parse(&contents),
        Err(_) => RawResult::Broken(format!("Results file '{file}' cannot be opened")),
    }
}

/// Reconciles a declared result with the child's termination status.
///
/// This is a pure function: identical inputs yield identical outputs. The
/// declared result is turned into [`RawResult::Broken`] whenever the exit
/// status contradicts it. An absent `status` means the child never
/// terminated on its own and is treated as a timeout regardless of the
/// `timed_out` flag.
pub fn reconcile(raw: RawResult, status: Option<&ExitStatus>, timed_out: bool) -> RawResult {
    if let RawResult::Broken(_) = raw {
        return raw;
    }

    if timed_out {
        return match raw {
            RawResult::ExpectedTimeout(_) => raw,
            _ => RawResult::Broken("Test case body timed out".to_owned()),
        };
    }

    let status = match status {
        Some(status) => status,
        None => return RawResult::Broken("Test case body timed out".to_owned()),
    };

    match &raw {
        RawResult::Broken(_) => unreachable!("handled above"),

        RawResult::ExpectedDeath(_) => raw,

        RawResult::ExpectedExit(expected, _) => match (expected, status) {
            (None, ExitStatus::Exited(_)) => raw,
            (Some(want), ExitStatus::Exited(got)) => {
                if want == got {
                    raw
                } else {
                    RawResult::Broken(format!(
                        "Expected clean exit with code {want} but got code {got}"
                    ))
                }
            }
            _ => RawResult::Broken(format!("Expected clean exit but {status}")),
        },

        RawResult::ExpectedFailure(_) => {
            if status.success() {
                raw
            } else {
                RawResult::Broken(format!(
                    "Expected failure should have reported success but {status}"
                ))
            }
        }

        RawResult::ExpectedSignal(expected, _) => match (expected, status) {
            (None, ExitStatus::Signaled { .. }) => raw,
            (Some(want), ExitStatus::Signaled { signal, .. }) => {
                if want == signal {
                    raw
                } else {
                    RawResult::Broken(format!("Expected signal {want} but got {signal}"))
                }
            }
            _ => RawResult::Broken(format!("Expected signal but {status}")),
        },

        RawResult::ExpectedTimeout(_) => {
            RawResult::Broken(format!("Expected timeout but {status}"))
        }

        RawResult::Failed(_) => match status {
            ExitStatus::Exited(code) if *code != 0 => raw,
            _ => RawResult::Broken(format!(
                "Failed test case should have reported failure but {status}"
            )),
        },

        RawResult::Passed => {
            if status.success() {
                raw
            } else {
                RawResult::Broken(format!(
                    "Passed test case should have reported success but {status}"
                ))
            }
        }

        RawResult::Skipped(_) => {
            if status.success() {
                raw
            } else {
                RawResult::Broken(format!(
                    "Skipped test case should have reported success but {status}"
                ))
            }
        }
    }
}

/// Folds the cleanup phase's termination status into the body's result.
///
/// The cleanup verdict is decisive only when the body result was good: a
/// failing body is reported as-is no matter what cleanup did, while a good
/// body is demoted to broken when cleanup timed out or did not exit
/// cleanly. `cleanup_status` is `None` when the cleanup phase timed out.
pub fn apply_cleanup(body: TestResult, cleanup_status: Option<&ExitStatus>) -> TestResult {
    if !body.good() {
        return body;
    }
    match cleanup_status {
        None => TestResult::Broken("Test case cleanup timed out".to_owned()),
        Some(status) if status.success() => body,
        Some(_) => {
            TestResult::Broken("Test case cleanup did not terminate successfully".to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn exited(code: i32) -> ExitStatus {
        ExitStatus::Exited(code)
    }

    fn signaled(signal: i32, core_dumped: bool) -> ExitStatus {
        ExitStatus::Signaled {
            signal,
            core_dumped,
        }
    }

    #[test_case("passed\n", RawResult::Passed; "passed")]
    #[test_case(
        "failed: got 5, expected 4\n",
        RawResult::Failed("got 5, expected 4".into());
        "failed with reason"
    )]
    #[test_case(
        "skipped: the kernel lacks feature X\n",
        RawResult::Skipped("the kernel lacks feature X".into());
        "skipped with reason"
    )]
    #[test_case(
        "broken: could not open fixture\n",
        RawResult::Broken("could not open fixture".into());
        "broken with reason"
    )]
    #[test_case(
        "expected_death: crashes on purpose\n",
        RawResult::ExpectedDeath("crashes on purpose".into());
        "expected death"
    )]
    #[test_case(
        "expected_failure: known bug #123\n",
        RawResult::ExpectedFailure("known bug #123".into());
        "expected failure"
    )]
    #[test_case(
        "expected_timeout: never returns\n",
        RawResult::ExpectedTimeout("never returns".into());
        "expected timeout"
    )]
    #[test_case(
        "expected_exit: any code works\n",
        RawResult::ExpectedExit(None, "any code works".into());
        "expected exit without code"
    )]
    #[test_case(
        "expected_exit(12): exits twelve\n",
        RawResult::ExpectedExit(Some(12), "exits twelve".into());
        "expected exit with code"
    )]
    #[test_case(
        "expected_exit(-1): negative\n",
        RawResult::ExpectedExit(Some(-1), "negative".into());
        "expected exit with negative code"
    )]
    #[test_case(
        "expected_signal: any signal\n",
        RawResult::ExpectedSignal(None, "any signal".into());
        "expected signal without number"
    )]
    #[test_case(
        "expected_signal(9): killed\n",
        RawResult::ExpectedSignal(Some(9), "killed".into());
        "expected signal with number"
    )]
    fn parse_well_formed(input: &str, expected: RawResult) {
        assert_eq!(parse(input), expected);
    }

    #[test_case("", "Empty test result or no new line"; "empty input")]
    #[test_case("passed", "Empty test result or no new line"; "missing newline")]
    #[test_case(
        "passed\ntrailing\n",
        "Test result contains multiple lines: passed<<NEWLINE>>trailing";
        "two lines"
    )]
    #[test_case(
        "passed\n\n",
        "Test result contains multiple lines: passed<<NEWLINE>>";
        "trailing blank line"
    )]
    #[test_case(
        "a\nb",
        "Test result contains multiple lines: a<<NEWLINE>>b";
        "second line without newline"
    )]
    #[test_case("exploded: boom\n", "Unknown test result 'exploded'"; "unknown status")]
    #[test_case("passed: hooray\n", "passed cannot have a reason"; "passed with reason")]
    #[test_case("failed\n", "failed must be followed by ': <reason>'"; "failed without reason")]
    #[test_case("failed:\n", "failed must be followed by ': <reason>'"; "failed empty reason")]
    #[test_case(
        "skipped \n",
        "skipped must be followed by ': <reason>'";
        "skipped with stray space"
    )]
    #[test_case(
        "expected_exit(abc): reason\n",
        "Invalid integer argument 'abc' to 'expected_exit' test case result";
        "non integer argument"
    )]
    #[test_case(
        "expected_signal(): reason\n",
        "Invalid integer argument '' to 'expected_signal' test case result";
        "empty argument"
    )]
    #[test_case(
        "expected_exit(5\n",
        "Invalid format for 'expected_exit' test case result; must be followed by \
         '[(num)]: <reason>' but found '(5'";
        "unmatched parenthesis"
    )]
    #[test_case(
        "expected_exit\n",
        "Invalid format for 'expected_exit' test case result; must be followed by \
         '[(num)]: <reason>' but found ''";
        "expected exit without delimiter"
    )]
    fn parse_malformed(input: &str, reason: &str) {
        assert_eq!(parse(input), RawResult::Broken(reason.to_owned()));
    }

    #[test]
    fn parse_formats_round_trip() {
        let results = vec![
            RawResult::Passed,
            RawResult::Failed("a reason".into()),
            RawResult::Skipped("a reason".into()),
            RawResult::Broken("a reason".into()),
            RawResult::ExpectedDeath("a reason".into()),
            RawResult::ExpectedExit(None, "a reason".into()),
            RawResult::ExpectedExit(Some(3), "a reason".into()),
            RawResult::ExpectedFailure("a reason".into()),
            RawResult::ExpectedSignal(None, "a reason".into()),
            RawResult::ExpectedSignal(Some(15), "a reason".into()),
            RawResult::ExpectedTimeout("a reason".into()),
        ];
        for result in results {
            assert_eq!(parse(&format!("{result}\n")), result);
        }
    }

    #[test]
    fn load_missing_file_is_broken() {
        let result = load(Utf8Path::new("/nonexistent/result.txt"));
        assert_eq!(
            result,
            RawResult::Broken(
                "Results file '/nonexistent/result.txt' cannot be opened".to_owned()
            )
        );
    }

    #[test]
    fn load_reads_file() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("result.txt");
        std::fs::write(&path, "passed\n").unwrap();
        assert_eq!(load(&path), RawResult::Passed);
    }

    #[test]
    fn reconcile_broken_passes_through() {
        let raw = RawResult::Broken("already broken".into());
        assert_eq!(
            reconcile(raw.clone(), Some(&exited(0)), false),
            raw.clone()
        );
        assert_eq!(reconcile(raw.clone(), None, true), raw);
    }

    #[test]
    fn reconcile_timeout() {
        assert_eq!(
            reconcile(RawResult::Passed, None, true),
            RawResult::Broken("Test case body timed out".into())
        );
        let raw = RawResult::ExpectedTimeout("slow by design".into());
        assert_eq!(reconcile(raw.clone(), None, true), raw);
    }

    #[test_case(RawResult::Passed, exited(0), RawResult::Passed; "passed clean")]
    #[test_case(
        RawResult::Passed,
        exited(127),
        RawResult::Broken("Passed test case should have reported success but exited with code 127".into());
        "passed with nonzero exit"
    )]
    #[test_case(
        RawResult::Passed,
        signaled(9, false),
        RawResult::Broken("Passed test case should have reported success but received signal 9".into());
        "passed but signaled"
    )]
    #[test_case(RawResult::Failed("r".into()), exited(1), RawResult::Failed("r".into()); "failed with exit 1")]
    #[test_case(RawResult::Failed("r".into()), exited(42), RawResult::Failed("r".into()); "failed with exit 42")]
    #[test_case(
        RawResult::Failed("r".into()),
        exited(0),
        RawResult::Broken("Failed test case should have reported failure but exited with code 0".into());
        "failed but exited cleanly"
    )]
    #[test_case(
        RawResult::Failed("r".into()),
        signaled(11, true),
        RawResult::Broken("Failed test case should have reported failure but received signal 11 (core dumped)".into());
        "failed but signaled"
    )]
    #[test_case(RawResult::Skipped("r".into()), exited(0), RawResult::Skipped("r".into()); "skipped clean")]
    #[test_case(
        RawResult::Skipped("r".into()),
        exited(1),
        RawResult::Broken("Skipped test case should have reported success but exited with code 1".into());
        "skipped with nonzero exit"
    )]
    #[test_case(RawResult::ExpectedDeath("r".into()), exited(3), RawResult::ExpectedDeath("r".into()); "expected death exit")]
    #[test_case(RawResult::ExpectedDeath("r".into()), signaled(9, false), RawResult::ExpectedDeath("r".into()); "expected death signal")]
    #[test_case(RawResult::ExpectedExit(None, "r".into()), exited(0), RawResult::ExpectedExit(None, "r".into()); "expected any exit zero")]
    #[test_case(RawResult::ExpectedExit(None, "r".into()), exited(1), RawResult::ExpectedExit(None, "r".into()); "expected any exit one")]
    #[test_case(
        RawResult::ExpectedExit(None, "r".into()),
        signaled(3, false),
        RawResult::Broken("Expected clean exit but received signal 3".into());
        "expected any exit but signaled"
    )]
    #[test_case(RawResult::ExpectedExit(Some(1), "r".into()), exited(1), RawResult::ExpectedExit(Some(1), "r".into()); "expected exit code match")]
    #[test_case(
        RawResult::ExpectedExit(Some(1), "r".into()),
        exited(0),
        RawResult::Broken("Expected clean exit with code 1 but got code 0".into());
        "expected exit code mismatch"
    )]
    #[test_case(RawResult::ExpectedFailure("r".into()), exited(0), RawResult::ExpectedFailure("r".into()); "expected failure clean")]
    #[test_case(
        RawResult::ExpectedFailure("r".into()),
        exited(1),
        RawResult::Broken("Expected failure should have reported success but exited with code 1".into());
        "expected failure with nonzero exit"
    )]
    #[test_case(RawResult::ExpectedSignal(None, "r".into()), signaled(1, false), RawResult::ExpectedSignal(None, "r".into()); "expected any signal")]
    #[test_case(
        RawResult::ExpectedSignal(None, "r".into()),
        exited(0),
        RawResult::Broken("Expected signal but exited with code 0".into());
        "expected signal but exited"
    )]
    #[test_case(RawResult::ExpectedSignal(Some(9), "r".into()), signaled(9, false), RawResult::ExpectedSignal(Some(9), "r".into()); "expected signal match")]
    #[test_case(
        RawResult::ExpectedSignal(Some(9), "r".into()),
        signaled(15, false),
        RawResult::Broken("Expected signal 9 but got 15".into());
        "expected signal mismatch"
    )]
    #[test_case(
        RawResult::ExpectedTimeout("r".into()),
        exited(0),
        RawResult::Broken("Expected timeout but exited with code 0".into());
        "expected timeout but finished"
    )]
    fn reconcile_against_status(raw: RawResult, status: ExitStatus, expected: RawResult) {
        assert_eq!(reconcile(raw, Some(&status), false), expected);
    }

    #[test]
    fn reconcile_is_pure() {
        let raw = RawResult::ExpectedExit(Some(2), "r".into());
        let status = exited(3);
        assert_eq!(
            reconcile(raw.clone(), Some(&status), false),
            reconcile(raw, Some(&status), false)
        );
    }

    #[test]
    fn externalize_coalesces_expected_variants() {
        for raw in [
            RawResult::ExpectedDeath("r".into()),
            RawResult::ExpectedExit(Some(2), "r".into()),
            RawResult::ExpectedFailure("r".into()),
            RawResult::ExpectedSignal(None, "r".into()),
            RawResult::ExpectedTimeout("r".into()),
        ] {
            assert_eq!(raw.externalize(), TestResult::ExpectedFailure("r".into()));
        }
        assert_eq!(RawResult::Passed.externalize(), TestResult::Passed);
        assert_eq!(
            RawResult::Failed("r".into()).externalize(),
            TestResult::Failed("r".into())
        );
        assert_eq!(
            RawResult::Skipped("r".into()).externalize(),
            TestResult::Skipped("r".into())
        );
        assert_eq!(
            RawResult::Broken("r".into()).externalize(),
            TestResult::Broken("r".into())
        );
    }

    #[test]
    fn cleanup_is_decisive_only_for_good_bodies() {
        // Good body, clean cleanup: untouched.
        assert_eq!(
            apply_cleanup(TestResult::Passed, Some(&exited(0))),
            TestResult::Passed
        );
        // Good body, failing cleanup: demoted.
        assert_eq!(
            apply_cleanup(TestResult::Passed, Some(&exited(1))),
            TestResult::Broken("Test case cleanup did not terminate successfully".into())
        );
        assert_eq!(
            apply_cleanup(TestResult::Skipped("r".into()), Some(&signaled(9, false))),
            TestResult::Broken("Test case cleanup did not terminate successfully".into())
        );
        // Good body, cleanup timeout: demoted with the timeout reason.
        assert_eq!(
            apply_cleanup(TestResult::Passed, None),
            TestResult::Broken("Test case cleanup timed out".into())
        );
        // Bad body: cleanup outcome is irrelevant.
        assert_eq!(
            apply_cleanup(TestResult::Failed("r".into()), Some(&exited(1))),
            TestResult::Failed("r".into())
        );
        assert_eq!(
            apply_cleanup(TestResult::Broken("r".into()), None),
            TestResult::Broken("r".into())
        );
    }
}
