use std::time::{Duration, Instant};

use arbiter::compare::{Outcome, Policy};
use arbiter::config::Problem;
use arbiter::error::{Component, ErrorKind};
use arbiter::judge::{AnswerSource, Judge, Stage, Submission, TestCase, Verdict};
use arbiter::process::InputSource;
use arbiter::types::ResourceLimits;

use super::{checker, fixture, source, test_config, text_case};

/// Judge `script` with the `sh` toolchain against a single case
async fn judge_one(script: &str, case: TestCase) -> arbiter::judge::JudgeResult {
    let judge = Judge::new(test_config());
    let submission = Submission::new(source(script), "sh", [case]);
    let mut report = judge
        .judge_submission(&submission)
        .await
        .expect("Judging failed");
    assert_eq!(report.results.len(), 1);
    report.results.remove(0)
}

#[tokio::test]
async fn test_accepted() {
    let result = judge_one("sum.sh", text_case("1", "1 2\n", "3\n")).await;

    assert_eq!(result.verdict, Verdict::Accepted);
    assert_eq!(result.score, Some(1.0));
    assert_eq!(result.stage, Stage::Done);
    assert!(result.time.is_some());
    assert!(result.memory.is_some());
    assert!(result.comparison.as_ref().is_some_and(|c| c.is_match()));
}

#[tokio::test]
async fn test_wrong_answer() {
    let result = judge_one("wrong.sh", text_case("1", "1 2\n", "3\n")).await;

    assert_eq!(result.verdict, Verdict::WrongAnswer);
    assert_eq!(result.score, Some(0.0));
    assert_eq!(result.stage, Stage::Done);
    assert_eq!(result.comparison.unwrap().outcome, Outcome::Mismatch);
}

#[tokio::test]
async fn test_runtime_error_on_exit_code() {
    let result = judge_one("exit3.sh", text_case("1", "", "partial\n")).await;

    assert_eq!(result.verdict, Verdict::RuntimeError);
    assert_eq!(result.stage, Stage::Running);
    assert_eq!(result.message, "exited with code 3");
    assert!(result.comparison.is_none());
}

#[tokio::test]
async fn test_runtime_error_on_signal() {
    let result = judge_one("crash.sh", text_case("1", "", "")).await;

    assert_eq!(result.verdict, Verdict::RuntimeError);
    assert_eq!(result.message, "killed by signal 11");
}

#[tokio::test]
async fn test_time_limit_exceeded() {
    let case = text_case("1", "", "done\n").with_limits(
        ResourceLimits::none()
            .with_time_limit(0.3)
            .with_extra_time(0.1),
    );
    let started = Instant::now();
    let result = judge_one("slow.sh", case).await;

    assert_eq!(result.verdict, Verdict::TimeLimitExceeded);
    assert_eq!(result.stage, Stage::Running);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_output_limit_exceeded_by_ratio() {
    let result = judge_one("chatty.sh", text_case("1", "", "5\n")).await;

    assert_eq!(result.verdict, Verdict::OutputLimitExceeded);
    assert_eq!(result.score, Some(0.0));
    assert!(result.message.contains("10 times"));
}

#[tokio::test]
async fn test_presentation_error() {
    let case = text_case("1", "1 2\n", "3\n").with_policy(Policy::Presentation);
    let result = judge_one("spaced_sum.sh", case).await;

    assert_eq!(result.verdict, Verdict::PresentationError);
}

#[tokio::test]
async fn test_token_comparison_ignores_spacing() {
    let result = judge_one("spaced_sum.sh", text_case("1", "1 2\n", "3\n")).await;

    assert_eq!(result.verdict, Verdict::Accepted);
}

#[tokio::test]
async fn test_numeric_tolerance() {
    let case = text_case("1", "1 2\n", "3.00001\n").with_policy(Policy::numeric());
    let result = judge_one("sum.sh", case).await;

    assert_eq!(result.verdict, Verdict::Accepted);
}

#[tokio::test]
async fn test_missing_input_is_system_error() {
    let judge = Judge::new(test_config());
    let cases = [
        TestCase::new(
            "missing",
            InputSource::file("/nonexistent/case.in"),
            AnswerSource::text("3\n"),
        ),
        text_case("present", "1 2\n", "3\n"),
    ];
    let submission = Submission::new(source("sum.sh"), "sh", cases);
    let report = judge.judge_submission(&submission).await.unwrap();

    assert_eq!(report.results[0].verdict, Verdict::SystemError);
    assert!(report.results[0].time.is_none());
    assert_eq!(report.results[1].verdict, Verdict::Accepted);
    assert_eq!(report.verdict, Verdict::SystemError);
}

#[tokio::test]
async fn test_missing_answer_is_system_error() {
    let case = TestCase::new(
        "1",
        InputSource::bytes("1 2\n"),
        AnswerSource::file("/nonexistent/case.ans"),
    );
    let result = judge_one("sum.sh", case).await;

    assert_eq!(result.verdict, Verdict::SystemError);
    assert_eq!(result.stage, Stage::Comparing);
    assert!(result.time.is_some());
}

#[tokio::test]
async fn test_compile_error_short_circuits() {
    let judge = Judge::new(test_config());
    let cases = [
        text_case("1", "1 2\n", "3\n"),
        text_case("2", "2 2\n", "4\n"),
    ];
    let submission = Submission::new(source("sum.sh"), "broken", cases);
    let report = judge.judge_submission(&submission).await.unwrap();

    assert!(!report.compiled);
    assert!(report.compile_diagnostics.contains("nothing compiles here"));
    assert_eq!(report.verdict, Verdict::CompileError);
    assert_eq!(report.score, 0.0);
    for result in &report.results {
        assert_eq!(result.verdict, Verdict::CompileError);
        assert_eq!(result.stage, Stage::Compiling);
        assert!(result.score.is_none());
        assert!(result.time.is_none());
    }
}

#[tokio::test]
async fn test_compiles_once_per_submission() {
    let judge = Judge::new(test_config());
    let submission = Submission::new(
        source("sum.sh"),
        "copy",
        [text_case("1", "1 2\n", "3\n")],
    );
    assert!(submission.compile_outcome().is_none());

    let first = judge.judge_submission(&submission).await.unwrap();
    let artifact = submission
        .compile_outcome()
        .and_then(|outcome| outcome.program())
        .map(|program| program.path().to_path_buf())
        .expect("Submission should be compiled");

    let second = judge.judge_submission(&submission).await.unwrap();
    let again = submission.compile_outcome().unwrap().program().unwrap().path();

    assert_eq!(artifact, again);
    assert_eq!(first.verdict, Verdict::Accepted);
    assert_eq!(first.verdict, second.verdict);
}

#[tokio::test]
async fn test_results_keep_case_order() {
    let judge = Judge::new(test_config());
    let cases = [
        text_case("slowest", "0.4 first\n", "first\n"),
        text_case("fastest", "0 second\n", "second\n"),
        text_case("middle", "0.2 third\n", "third\n"),
    ];
    let submission = Submission::new(source("sleepy_echo.sh"), "sh", cases);
    let report = judge.judge_submission(&submission).await.unwrap();

    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["slowest", "fastest", "middle"]);
    for (index, result) in report.results.iter().enumerate() {
        assert_eq!(result.index, index);
        assert_eq!(result.verdict, Verdict::Accepted);
    }
    assert_eq!(report.score, 3.0);
    assert_eq!(report.passed(), 3);
}

#[tokio::test]
async fn test_submission_time_limit_keeps_finished_cases() {
    let mut config = test_config();
    config.submission_time_limit = Some(1.0);
    let judge = Judge::new(config);

    let limits = ResourceLimits::none().with_time_limit(20.0);
    let cases = [
        text_case("fast", "0 quick\n", "quick\n").with_limits(limits.clone()),
        text_case("slow", "10 late\n", "late\n").with_limits(limits),
    ];
    let submission = Submission::new(source("sleepy_echo.sh"), "sh", cases);

    let started = Instant::now();
    let report = judge.judge_submission(&submission).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.results[0].verdict, Verdict::Accepted);
    assert_eq!(report.results[0].score, Some(1.0));
    assert_eq!(report.results[1].verdict, Verdict::Cancelled);
    assert_eq!(report.results[1].stage, Stage::Pending);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_detached_child_does_not_lose_output() {
    let result = judge_one("detached_echo.sh", text_case("1", "", "42\n")).await;

    assert_eq!(result.verdict, Verdict::Accepted);
}

#[tokio::test]
async fn test_submission_time_limit_cancels_cases() {
    let mut config = test_config();
    config.submission_time_limit = Some(0.5);
    let judge = Judge::new(config);

    let limits = ResourceLimits::none().with_time_limit(10.0);
    let cases: Vec<_> = (1..=3)
        .map(|i| text_case(&i.to_string(), "", "").with_limits(limits.clone()))
        .collect();
    let submission = Submission::new(source("slow.sh"), "sh", cases);

    let started = Instant::now();
    let report = judge.judge_submission(&submission).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.verdict, Verdict::Cancelled);
    for result in &report.results {
        assert_eq!(result.verdict, Verdict::Cancelled);
        assert!(result.score.is_none());
    }
}

#[tokio::test]
async fn test_output_reproduced_by_same_program_is_accepted() {
    let judge = Judge::new(test_config());
    let outcome = judge
        .runner()
        .compile(&source("sum.sh"), "sh", None)
        .await
        .unwrap();
    let program = outcome.program().unwrap();
    let produced = judge
        .runner()
        .run(program, InputSource::bytes("123 456\n"), None)
        .await
        .unwrap();

    let case = TestCase::new(
        "replay",
        InputSource::bytes("123 456\n"),
        AnswerSource::text(produced.stdout),
    )
    .with_policy(Policy::StrictNaive);
    let result = judge.judge_case(program, 0, &case).await.unwrap();

    assert_eq!(result.verdict, Verdict::Accepted);
}

#[tokio::test]
async fn test_checker_accepts_and_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let policy = Policy::Checker {
        path: checker("exact.sh", dir.path()),
        time_limit: None,
    };
    let judge = Judge::new(test_config());
    let cases = [
        text_case("right", "1 2\n", "3\n").with_policy(policy.clone()),
        text_case("wrong", "1 2\n", "4\n").with_policy(policy),
    ];
    let submission = Submission::new(source("sum.sh"), "sh", cases);
    let report = judge.judge_submission(&submission).await.unwrap();

    assert_eq!(report.results[0].verdict, Verdict::Accepted);
    assert_eq!(report.results[0].message, "outputs are identical");
    assert_eq!(report.results[1].verdict, Verdict::WrongAnswer);
    assert_eq!(report.results[1].message, "outputs differ");
}

#[tokio::test]
async fn test_checker_partial_score() {
    let dir = tempfile::tempdir().unwrap();
    let policy = Policy::Checker {
        path: checker("half.sh", dir.path()),
        time_limit: None,
    };
    let result = judge_one("sum.sh", text_case("1", "1 2\n", "3\n").with_policy(policy)).await;

    assert_eq!(result.verdict, Verdict::PartiallyCorrect);
    assert_eq!(result.score, Some(0.5));
    assert_eq!(result.message, "half of the answer");
}

#[tokio::test]
async fn test_checker_failure_aborts_judging() {
    let dir = tempfile::tempdir().unwrap();
    let policy = Policy::Checker {
        path: checker("broken.sh", dir.path()),
        time_limit: None,
    };
    let judge = Judge::new(test_config());
    let submission = Submission::new(
        source("sum.sh"),
        "sh",
        [text_case("1", "1 2\n", "3\n").with_policy(policy)],
    );
    let err = judge.judge_submission(&submission).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ValidationFailed);
    assert_eq!(err.component, Component::Comparator);
    assert!(err.message.contains("answer file is malformed"));
}

#[tokio::test]
async fn test_missing_checker_is_system_error() {
    let policy = Policy::Checker {
        path: "/nonexistent/checker".into(),
        time_limit: None,
    };
    let result = judge_one("sum.sh", text_case("1", "1 2\n", "3\n").with_policy(policy)).await;

    assert_eq!(result.verdict, Verdict::SystemError);
    assert_eq!(result.stage, Stage::Comparing);
}

#[tokio::test]
async fn test_problem_manifest() {
    let problem = Problem::from_file(fixture("problems/sum/problem.toml")).unwrap();
    let cases = problem.test_cases().unwrap();
    let judge = Judge::new(test_config());
    let submission = Submission::new(source("sum.sh"), "sh", cases);
    let report = judge.judge_submission(&submission).await.unwrap();

    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["small", "2", "negative"]);
    assert_eq!(report.verdict, Verdict::Accepted);
    assert_eq!(report.passed(), 3);
}

#[tokio::test]
async fn test_judging_twice_gives_same_verdicts() {
    let judge = Judge::new(test_config());
    let submission = Submission::new(
        source("wrong_on_3.sh"),
        "sh",
        [
            text_case("1", "1 1\n", "2\n"),
            text_case("3", "3 3\n", "6\n"),
        ],
    );
    let first = judge.judge_submission(&submission).await.unwrap();
    let second = judge.judge_submission(&submission).await.unwrap();

    let verdicts = |report: &arbiter::judge::SubmissionReport| {
        report.results.iter().map(|r| r.verdict).collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), [Verdict::Accepted, Verdict::WrongAnswer]);
    assert_eq!(verdicts(&first), verdicts(&second));
}
