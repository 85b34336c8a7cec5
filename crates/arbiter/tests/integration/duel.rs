use arbiter::judge::{Duel, Judge, Side, Verdict};
use arbiter::runner::Program;

use super::{source, test_config};

async fn program(judge: &Judge, script: &str) -> Program {
    judge
        .runner()
        .compile(&source(script), "sh", None)
        .await
        .expect("Compile call failed")
        .program()
        .cloned()
        .expect("Shell script should compile")
}

#[tokio::test]
async fn test_candidate_loses_on_third_round() {
    let judge = Judge::new(test_config());
    let keep = tempfile::tempdir().unwrap();
    let duel = Duel::new(
        program(&judge, "gen.sh").await,
        program(&judge, "sum.sh").await,
        program(&judge, "wrong_on_3.sh").await,
    )
    .keep_inputs_in(keep.path());

    let report = judge.duel(&duel, Some(10)).await.expect("Duel failed");

    assert!(!report.survived());
    assert_eq!(report.rounds, 2);
    let failure = report.failure.unwrap();
    assert_eq!(failure.round, 3);
    assert_eq!(failure.side, Side::Candidate);
    assert_eq!(failure.verdict, Verdict::WrongAnswer);

    let input = failure.input.expect("Losing input should be kept");
    assert!(input.starts_with(keep.path()));
    assert_eq!(std::fs::read_to_string(input).unwrap(), "3 3\n");
}

#[tokio::test]
async fn test_matching_programs_survive() {
    let judge = Judge::new(test_config());
    let sum = program(&judge, "sum.sh").await;
    let duel = Duel::new(program(&judge, "gen.sh").await, sum.clone(), sum);

    let report = judge.duel(&duel, Some(4)).await.expect("Duel failed");

    assert!(report.survived());
    assert_eq!(report.rounds, 4);
}

#[tokio::test]
async fn test_failing_reference_is_reported() {
    let judge = Judge::new(test_config());
    let keep = tempfile::tempdir().unwrap();
    let duel = Duel::new(
        program(&judge, "gen.sh").await,
        program(&judge, "crash.sh").await,
        program(&judge, "sum.sh").await,
    )
    .keep_inputs_in(keep.path());

    let report = judge.duel(&duel, None).await.expect("Duel failed");

    let failure = report.failure.expect("Reference should fail");
    assert_eq!(failure.round, 1);
    assert_eq!(failure.side, Side::Reference);
    assert_eq!(failure.verdict, Verdict::RuntimeError);
    assert_eq!(report.rounds, 0);
}

#[tokio::test]
async fn test_failing_generator_keeps_no_input() {
    let judge = Judge::new(test_config());
    let sum = program(&judge, "sum.sh").await;
    let duel = Duel::new(program(&judge, "exit3.sh").await, sum.clone(), sum);

    let report = judge.duel(&duel, None).await.expect("Duel failed");

    let failure = report.failure.expect("Generator should fail");
    assert_eq!(failure.side, Side::Generator);
    assert_eq!(failure.message, "exited with code 3");
    assert!(failure.input.is_none());
}
