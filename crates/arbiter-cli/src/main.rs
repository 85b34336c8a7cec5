//! Arbiter CLI
//!
//! A command-line tool for compiling, running and judging programs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arbiter::{
    ComparatorRegistry, CompileOutcome, Config, Duel, EXAMPLE_CONFIG, InputSource, Judge,
    Problem, Program, ResourceLimits, Submission, Verdict,
};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(about = "A tool for compiling, running and judging programs")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Limit overrides given on the command line
#[derive(Args)]
struct LimitArgs {
    /// Time limit in seconds
    #[arg(short, long)]
    time_limit: Option<f64>,

    /// Memory limit in KB
    #[arg(short, long)]
    memory_limit: Option<u64>,
}

impl LimitArgs {
    /// Only explicitly given values, so they don't override configured defaults
    fn overrides(&self) -> Option<ResourceLimits> {
        if self.time_limit.is_none() && self.memory_limit.is_none() {
            return None;
        }
        Some(ResourceLimits {
            time_limit: self.time_limit,
            memory_limit: self.memory_limit,
            ..ResourceLimits::none()
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: arbiter.toml)
        #[arg(short, long, default_value = "arbiter.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Compile source code
    Compile {
        /// Source file to compile
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Toolchain ID (detected from the extension if omitted)
        #[arg(short = 'l', long)]
        toolchain: Option<String>,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Toolchain ID (detected from the extension if omitted)
        #[arg(short = 'l', long)]
        toolchain: Option<String>,

        /// Input file (default: empty)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Judge a submission against a problem's test cases
    Judge {
        /// Source file to judge
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Problem manifest listing the test cases
        #[arg(short, long)]
        problem: PathBuf,

        /// Toolchain ID (detected from the extension if omitted)
        #[arg(short = 'l', long)]
        toolchain: Option<String>,
    },

    /// Stress test a candidate against a reference on generated inputs
    Duel {
        /// Generator source, run with the round number as its argument
        #[arg(short, long)]
        generator: PathBuf,

        /// Reference solution source
        #[arg(short, long)]
        reference: PathBuf,

        /// Candidate solution source
        #[arg(value_name = "FILE")]
        candidate: PathBuf,

        /// Number of rounds (default: until a program fails)
        #[arg(short = 'n', long)]
        rounds: Option<u64>,

        /// Comparator name
        #[arg(long, default_value = "token")]
        comparator: String,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// List available toolchains
    Toolchains,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Compile {
            source,
            toolchain,
            limits,
        } => run_compile(config, &source, toolchain.as_deref(), &limits).await,
        Commands::Run {
            source,
            toolchain,
            input,
            limits,
        } => run_execute(config, &source, toolchain.as_deref(), input, &limits).await,
        Commands::Judge {
            source,
            problem,
            toolchain,
        } => run_judge(config, &source, &problem, toolchain.as_deref()).await,
        Commands::Duel {
            generator,
            reference,
            candidate,
            rounds,
            comparator,
            limits,
        } => {
            let programs = [generator, reference, candidate];
            run_duel(config, &programs, rounds, &comparator, &limits).await
        }
        Commands::Toolchains => {
            list_toolchains(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

fn toolchain_id(config: &Config, source: &Path, toolchain: Option<&str>) -> Result<String> {
    match toolchain {
        Some(id) => Ok(id.to_string()),
        None => {
            let (id, _) = config
                .toolchain_for_source(source)
                .context("cannot detect toolchain, pass --toolchain")?;
            Ok(id.to_string())
        }
    }
}

/// Compile a source, printing diagnostics and exiting on failure
async fn build(judge: &Judge, source: &Path, toolchain: Option<&str>) -> Result<Program> {
    let id = toolchain_id(judge.config(), source, toolchain)?;
    info!(toolchain = %id, source = %source.display(), "compiling");

    let outcome = judge
        .runner()
        .compile(source, &id, None)
        .await
        .context("compilation could not run")?;

    match outcome {
        CompileOutcome::Compiled { program, .. } => Ok(program),
        CompileOutcome::Failed(failure) => {
            eprintln!("Compilation of '{}' failed: {}", source.display(), failure.reason);
            eprintln!("{}", failure.diagnostics);
            std::process::exit(1);
        }
    }
}

async fn run_compile(
    config: Config,
    source: &Path,
    toolchain: Option<&str>,
    limits: &LimitArgs,
) -> Result<()> {
    let judge = Judge::new(config);
    let id = toolchain_id(judge.config(), source, toolchain)?;
    let toolchain = judge.config().get_toolchain(&id)?;

    if !toolchain.is_compiled() {
        println!("Toolchain '{}' does not require compilation", toolchain.name);
        return Ok(());
    }

    info!(toolchain = %toolchain.name, "compiling source");
    let overrides = limits.overrides();
    let outcome = judge
        .runner()
        .compile(source, &id, overrides.as_ref())
        .await
        .context("compilation could not run")?;

    match outcome {
        CompileOutcome::Compiled {
            program,
            diagnostics,
        } => {
            println!("Compilation successful");
            println!("Artifact: {}", program.path().display());
            if !diagnostics.is_empty() {
                println!("\nCompiler output:\n{diagnostics}");
            }
        }
        CompileOutcome::Failed(failure) => {
            println!("Compilation failed: {}", failure.reason);
            println!("Time: {:.3}s", failure.execution.wall_time);
            println!("Memory: {} KB", failure.execution.memory);
            if !failure.diagnostics.is_empty() {
                println!("\nCompiler output:\n{}", failure.diagnostics);
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run_execute(
    config: Config,
    source: &Path,
    toolchain: Option<&str>,
    input: Option<PathBuf>,
    limits: &LimitArgs,
) -> Result<()> {
    let judge = Judge::new(config);
    let program = build(&judge, source, toolchain).await?;
    let input = input.map(InputSource::File).unwrap_or_default();

    info!("executing program");
    let overrides = limits.overrides();
    let result = judge
        .runner()
        .run(&program, input, overrides.as_ref())
        .await
        .context("execution failed")?;

    print!("{}", String::from_utf8_lossy(&result.stdout));
    let stderr = result.stderr_lossy();
    if !stderr.is_empty() {
        eprintln!("{stderr}");
    }

    // Execution info goes to stderr, keeping stdout clean for piping
    info!(
        termination = ?result.termination,
        time = format_args!("{:.3}s", result.wall_time),
        memory = format_args!("{} KB", result.memory),
        truncated = result.truncated,
        "execution result"
    );

    if result.is_success(judge.config().success_exit_code) {
        Ok(())
    } else {
        std::process::exit(result.exit_code().unwrap_or(1));
    }
}

async fn run_judge(
    config: Config,
    source: &Path,
    problem: &Path,
    toolchain: Option<&str>,
) -> Result<()> {
    let problem = Problem::from_file(problem).context("failed to load problem")?;
    let cases = problem.test_cases()?;
    let id = toolchain_id(&config, source, toolchain)?;

    let judge = Judge::new(config);
    let submission = Submission::new(source, id, cases);
    let report = judge
        .judge_submission(&submission)
        .await
        .context("judging aborted")?;

    if !report.compiled {
        println!("Compilation failed:\n{}", report.compile_diagnostics);
    }
    for result in &report.results {
        println!("#{:<3} {:<12} {}", result.index + 1, result.name, result.summary_line());
    }
    println!();
    println!(
        "{} ({}/{} passed, score {:.2})",
        report.verdict,
        report.passed(),
        report.results.len(),
        report.score
    );

    if report.verdict != Verdict::Accepted {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_duel(
    config: Config,
    [generator, reference, candidate]: &[PathBuf; 3],
    rounds: Option<u64>,
    comparator: &str,
    limits: &LimitArgs,
) -> Result<()> {
    let policy = ComparatorRegistry::new().get(comparator)?.clone();
    let judge = Judge::new(config);

    let generator = build(&judge, generator, None).await?;
    let reference = build(&judge, reference, None).await?;
    let candidate = build(&judge, candidate, None).await?;

    let mut duel = Duel::new(generator, reference, candidate)
        .with_policy(policy)
        .keep_inputs_in(".");
    if let Some(overrides) = limits.overrides() {
        duel = duel.with_limits(overrides);
    }

    let report = judge.duel(&duel, rounds).await.context("duel aborted")?;

    match report.failure {
        None => {
            println!("Both programs survived {} rounds", report.rounds);
            Ok(())
        }
        Some(failure) => {
            println!(
                "Round {}: {:?} lost with {} ({})",
                failure.round,
                failure.side,
                failure.verdict,
                failure.message
            );
            if let Some(input) = failure.input {
                println!("Input kept at '{}'", input.display());
            }
            println!("Rounds survived: {}", report.rounds);
            std::process::exit(1);
        }
    }
}

fn list_toolchains(config: &Config) {
    println!("Available toolchains:\n");

    let mut toolchains: Vec<_> = config.toolchains.iter().collect();
    toolchains.sort_by_key(|(id, _)| *id);

    for (id, toolchain) in toolchains {
        let kind = if toolchain.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!(
            "  {:<15} {} (.{}, {})",
            id, toolchain.name, toolchain.extension, kind
        );
    }
}

fn show_config(config: &Config) {
    println!("Default resource limits:");
    println!("  Time limit: {:?}", config.default_limits.time_limit);
    println!("  Extra time: {:?}", config.default_limits.extra_time);
    println!(
        "  Memory limit: {:?} KB",
        config.default_limits.memory_limit
    );
    println!("  Stack limit: {:?} KB", config.default_limits.stack_limit);
    println!("  Max output: {:?} KB", config.default_limits.max_output);
    println!();
    println!("Workers: {}", config.workers);
    println!(
        "Submission time limit: {:?}",
        config.submission_time_limit
    );
    println!("Scratch directory: {}", config.scratch_root().display());
    println!();
    println!("Toolchains configured: {}", config.toolchains.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
