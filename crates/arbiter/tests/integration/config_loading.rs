use arbiter::compare::Policy;
use arbiter::config::{Config, ConfigError, EXAMPLE_CONFIG, Problem};
use arbiter::process::InputSource;

use super::{fixture, test_config};

#[test]
fn test_load_fixture_config() {
    let config = test_config();

    assert_eq!(config.workers, 2);
    assert_eq!(config.memory_poll_interval_ms, 10);
    assert_eq!(config.output_ratio_limit, Some(10));
    assert_eq!(config.default_limits.time_limit, Some(2.0));
    assert_eq!(config.default_limits.max_output, Some(1024));

    let mut ids: Vec<_> = config.toolchains.keys().map(String::as_str).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["broken", "copy", "sh"]);
    assert!(!config.get_toolchain("sh").unwrap().is_compiled());
    assert!(config.get_toolchain("copy").unwrap().is_compiled());
}

#[test]
fn test_example_config_parses() {
    let config = Config::parse_toml(EXAMPLE_CONFIG).expect("Example config should parse");

    for id in ["c11", "cpp17", "cpp20", "rust", "python3", "sh"] {
        assert!(config.get_toolchain(id).is_ok(), "missing toolchain {id}");
    }
}

#[test]
fn test_missing_config_file() {
    let err = Config::from_file("/nonexistent/arbiter.toml").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn test_invalid_limits_rejected() {
    let err = Config::parse_toml("[default_limits]\ntime_limit = -1.0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Limits(_)));
}

#[test]
fn test_zero_workers_rejected() {
    let err = Config::parse_toml("workers = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_problem_manifest() {
    let problem = Problem::from_file(fixture("problems/sum/problem.toml")).unwrap();
    let cases = problem.test_cases().unwrap();

    assert_eq!(cases.len(), 3);
    assert_eq!(
        cases[0].input,
        InputSource::File(fixture("problems/sum/tests/1.in"))
    );
    assert_eq!(cases[0].policy, Policy::Token);
    assert_eq!(cases[1].policy, Policy::StrictNaive);
    assert_eq!(cases[0].limits.as_ref().unwrap().time_limit, Some(1.0));
    assert_eq!(cases[2].limits.as_ref().unwrap().time_limit, Some(2.0));
}
