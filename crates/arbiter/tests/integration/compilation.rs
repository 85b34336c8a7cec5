use arbiter::config::{Config, CppStandard, GccCommand, Optimization, Warnings};
use arbiter::error::{Component, ErrorKind};
use arbiter::process::InputSource;
use arbiter::runner::{CompileFailureReason, CompileOutcome, Runner};
use arbiter::types::Termination;

use super::{source, test_config};

#[tokio::test]
async fn test_interpreted_toolchain_runs_source_in_place() {
    let runner = Runner::new(test_config());
    let outcome = runner
        .compile(&source("sum.sh"), "sh", None)
        .await
        .expect("Compile call failed");

    let program = outcome.program().expect("Interpreted source should compile");
    assert_eq!(program.path(), source("sum.sh"));
    assert_eq!(program.toolchain(), "sh");
    assert!(outcome.diagnostics().is_empty());

    let result = runner
        .run(program, InputSource::bytes("1 2\n"), None)
        .await
        .expect("Run failed");
    assert_eq!(result.stdout, b"3\n");
}

#[tokio::test]
async fn test_compiled_toolchain_builds_artifact() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.scratch_dir = Some(scratch.path().to_path_buf());
    let runner = Runner::new(config);

    let outcome = runner
        .compile(&source("sum.sh"), "copy", None)
        .await
        .expect("Compile call failed");

    let program = outcome.program().expect("Copy should succeed");
    assert!(program.path().starts_with(scratch.path()));
    assert!(program.path().ends_with("main.sh"));
    assert!(program.path().is_file());

    let result = runner
        .run(program, InputSource::bytes("20 22\n"), None)
        .await
        .expect("Run failed");
    assert_eq!(result.stdout, b"42\n");
}

#[tokio::test]
async fn test_build_directory_removed_with_program() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.scratch_dir = Some(scratch.path().to_path_buf());
    let runner = Runner::new(config);

    let outcome = runner
        .compile(&source("sum.sh"), "copy", None)
        .await
        .unwrap();
    let build_dir = outcome.program().unwrap().working_dir().to_path_buf();
    assert!(build_dir.is_dir());

    drop(outcome);
    assert!(!build_dir.exists());
}

#[tokio::test]
async fn test_compiler_failure_is_an_outcome() {
    let runner = Runner::new(test_config());
    let outcome = runner
        .compile(&source("sum.sh"), "broken", None)
        .await
        .expect("Compile call failed");

    match outcome {
        CompileOutcome::Failed(failure) => {
            assert_eq!(failure.reason, CompileFailureReason::ExitCode(1));
            assert!(failure.diagnostics.contains("nothing compiles here"));
            assert_eq!(failure.execution.termination, Termination::Exited(1));
        }
        CompileOutcome::Compiled { .. } => panic!("broken toolchain compiled"),
    }
}

#[tokio::test]
async fn test_detects_toolchain_by_extension() {
    let runner = Runner::new(test_config());
    let outcome = runner
        .compile_detected(&source("sum.sh"), None)
        .await
        .expect("Compile call failed");

    assert_eq!(outcome.program().unwrap().toolchain(), "sh");
}

#[tokio::test]
async fn test_unknown_extension_is_unsupported() {
    let runner = Runner::new(test_config());
    let err = runner
        .compile_detected(&source("sum.cpp"), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
}

#[tokio::test]
async fn test_unknown_toolchain_is_unsupported() {
    let runner = Runner::new(test_config());
    let err = runner
        .compile(&source("sum.sh"), "cobol", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
    assert_eq!(err.component, Component::Compiler);
}

#[tokio::test]
async fn test_missing_source_is_file_error() {
    let runner = Runner::new(test_config());
    let err = runner
        .compile(&source("missing.sh"), "sh", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::FileError);
    assert_eq!(err.component, Component::Compiler);
}

#[tokio::test]
async fn test_compile_and_run() {
    let runner = Runner::new(test_config());
    let (outcome, result) = runner
        .compile_and_run(&source("sum.sh"), "copy", InputSource::bytes("5 6\n"), None)
        .await
        .expect("Compile and run failed");

    assert!(outcome.is_success());
    assert_eq!(result.expect("Program should have run").stdout, b"11\n");
}

#[tokio::test]
async fn test_compile_and_run_stops_on_compile_failure() {
    let runner = Runner::new(test_config());
    let (outcome, result) = runner
        .compile_and_run(&source("sum.sh"), "broken", InputSource::Empty, None)
        .await
        .expect("Compile and run failed");

    assert!(!outcome.is_success());
    assert!(result.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "toolchain-tests"), ignore = "requires g++")]
async fn test_compile_cpp_success() {
    let runner = Runner::new(Config::default());
    let outcome = runner
        .compile(&source("sum.cpp"), "cpp17", None)
        .await
        .expect("Compile call failed");
    let program = outcome.program().expect("sum.cpp should compile");

    let result = runner
        .run(program, InputSource::bytes("100 23\n"), None)
        .await
        .expect("Run failed");
    assert_eq!(result.stdout, b"123\n");
}

#[tokio::test]
#[cfg_attr(not(feature = "toolchain-tests"), ignore = "requires g++")]
async fn test_compile_cpp_error() {
    let runner = Runner::new(Config::default());
    let outcome = runner
        .compile(&source("compile_error.cpp"), "cpp17", None)
        .await
        .expect("Compile call failed");

    assert!(!outcome.is_success());
    assert!(outcome.diagnostics().contains("error"));
}

#[tokio::test]
#[cfg_attr(not(feature = "toolchain-tests"), ignore = "requires g++")]
async fn test_gcc_command_toolchain_compiles_and_runs() {
    let toolchain = GccCommand::new()
        .with_standard(CppStandard::Cpp17)
        .with_optimization(Optimization::O2)
        .with_warnings(Warnings::STANDARD)
        .define("ONLINE_JUDGE", "1")
        .with_output_name("solution")
        .into_toolchain("GNU C++17 (generated)", "cc")
        .expect("Toolchain should build");
    let mut config = Config::default();
    config.toolchains.insert("gxx".to_string(), toolchain);
    let runner = Runner::new(config);

    let outcome = runner
        .compile(&source("sum.cpp"), "gxx", None)
        .await
        .expect("Compile call failed");
    let program = outcome.program().expect("sum.cpp should compile");
    assert!(program.path().ends_with("solution"));

    let result = runner
        .run(program, InputSource::bytes("40 2\n"), None)
        .await
        .expect("Run failed");
    assert_eq!(result.termination, Termination::Exited(0));
    assert_eq!(result.stdout, b"42\n");
}
