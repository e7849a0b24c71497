use clap::{Parser, Subcommand};
use colored::Colorize;
use crossbeam_channel::RecvTimeoutError;
use livejs_lang::{
    Engine, ExecutionResult, LogLevel, RunOptions, RunOutcome, TransformOptions, TranspileCache,
};
use livejs_repl::{Repl, render::render_result};
use miette::IntoDiagnostic;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::config::{Config, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "livejs")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To run a script and show the value of every top-level expression:\n\
    livejs run script.js\n\n\
    ## To guard against runaway loops:\n\
    livejs run --loop-protection script.js\n\n\
    ## To see the instrumented source:\n\
    livejs transform script.js\n\n\
    ## To start a REPL session:\n\
    livejs repl")]
#[command(
    about = "livejs runs JavaScript and shows the value of each line next to it.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct TransformArgs {
    /// Bound every loop to 10000 iterations
    #[arg(long, default_value_t = false)]
    loop_protection: bool,

    /// Also report values marked with a `//?` comment, at any depth
    #[arg(long, default_value_t = false)]
    magic_comments: bool,

    /// Do not report stray top-level expressions
    #[arg(long, default_value_t = false)]
    no_top_level_results: bool,

    /// Report `undefined` values too
    #[arg(long, default_value_t = false)]
    show_undefined: bool,

    /// Internal log level; `debug` also reports declarations and assignments
    #[arg(long, value_name = "LEVEL", default_value = "none")]
    log_level: LogLevel,
}

impl TransformArgs {
    fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            show_top_level_results: !self.no_top_level_results,
            loop_protection: self.loop_protection,
            magic_comments: self.magic_comments,
            show_undefined: self.show_undefined,
            internal_log_level: self.log_level,
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            show_undefined: self.show_undefined,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a script and print each reported value with its line number
    Run {
        #[clap(flatten)]
        options: TransformArgs,

        /// Do not read or write the persistent transpile cache
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Cancel the run after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,

        /// Script to run; `-` or nothing reads stdin
        file: Option<PathBuf>,
    },
    /// Print the instrumented source of a script
    Transform {
        #[clap(flatten)]
        options: TransformArgs,

        /// Script to transform; `-` or nothing reads stdin
        file: Option<PathBuf>,
    },
    /// Inspect or clear the persistent transpile cache
    Cache {
        #[clap(subcommand)]
        action: CacheAction,
    },
    /// Start a REPL session
    Repl {
        #[clap(flatten)]
        options: TransformArgs,
    },
}

#[derive(Debug, Subcommand)]
enum CacheAction {
    /// Show cache statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Remove every cached entry
    Clear,
}

impl Cli {
    pub fn run(self) -> miette::Result<ExitCode> {
        let config = Config::from_env();
        init_tracing(&config);
        config.report_warnings();

        if !io::stdout().is_terminal() {
            colored::control::set_override(false);
        }

        match self.commands {
            Commands::Run {
                options,
                no_cache,
                timeout,
                file,
            } => {
                let source = read_source(file.as_ref())?;
                let mut engine = if no_cache {
                    Engine::new(TranspileCache::in_memory(config.cache.clone()))
                } else {
                    open_engine(&config)
                };
                let outcome = Self::execute(
                    &mut engine,
                    &source,
                    &options,
                    timeout.map(Duration::from_millis),
                )?;
                engine.dispose();

                tracing::debug!(?outcome, stats = ?engine.cache_stats(), "run finished");
                Ok(exit_code(outcome))
            }
            Commands::Transform { options, file } => {
                let source = read_source(file.as_ref())?;
                let output = open_engine(&config)
                    .transform(&source, &options.transform_options())
                    .map_err(miette::Report::new)?;

                let mut stdout = io::stdout().lock();
                stdout.write_all(output.as_bytes()).into_diagnostic()?;
                stdout.flush().into_diagnostic()?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Cache { action } => {
                let mut engine = open_engine(&config);
                match action {
                    CacheAction::Stats { json } => {
                        let stats = engine.cache_stats();
                        if json {
                            println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
                        } else {
                            println!("{:<12}{}", "entries", stats.size);
                            println!("{:<12}{}", "hits", stats.hits);
                            println!("{:<12}{}", "misses", stats.misses);
                            println!("{:<12}{:.2}", "hit rate", stats.hit_rate);
                            println!("{:<12}{}", "memory", stats.memory_bytes);
                        }
                    }
                    CacheAction::Clear => {
                        engine.cache_mut().clear();
                        println!("{}", "Cache cleared".bright_black());
                    }
                }
                engine.dispose();
                Ok(ExitCode::SUCCESS)
            }
            Commands::Repl { options } => {
                Repl::new(
                    open_engine(&config),
                    options.transform_options(),
                    options.run_options(),
                )
                .run()?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    fn execute(
        engine: &mut Engine,
        source: &str,
        options: &TransformArgs,
        timeout: Option<Duration>,
    ) -> miette::Result<RunOutcome> {
        let mut stdout = io::stdout().lock();
        let mut print = |result: ExecutionResult| writeln!(stdout, "{}", render_result(&result));

        let Some(timeout) = timeout else {
            let mut failed_write = None;
            let outcome = engine.evaluate(
                source,
                &options.transform_options(),
                options.run_options(),
                |result| {
                    if failed_write.is_none()
                        && let Err(err) = print(result)
                    {
                        failed_write = Some(err);
                    }
                },
            );
            return match failed_write {
                Some(err) => Err(err).into_diagnostic(),
                None => Ok(outcome),
            };
        };

        let instrumented = match engine.transform(source, &options.transform_options()) {
            Ok(instrumented) => instrumented,
            Err(err) => {
                print(ExecutionResult::error(err.message())).into_diagnostic()?;
                return Ok(RunOutcome::Failed);
            }
        };

        let handle = engine
            .spawn(instrumented, options.run_options())
            .into_diagnostic()?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match handle.results().recv_timeout(remaining) {
                Ok(result) => print(result).into_diagnostic()?,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::debug!(?timeout, "run timed out");
                    handle.cancel();
                    for result in handle.results().iter() {
                        print(result).into_diagnostic()?;
                    }
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let (outcome, rest) = handle.join();
        for result in rest {
            print(result).into_diagnostic()?;
        }
        Ok(outcome)
    }
}

fn read_source(file: Option<&PathBuf>) -> miette::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .map_err(|err| miette::miette!("Failed to read {}: {}", path.display(), err)),
        _ => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source).into_diagnostic()?;
            Ok(source)
        }
    }
}

/// An engine over the persistent cache, or a private one when there is no
/// cache directory.
fn open_engine(config: &Config) -> Engine {
    match &config.cache_dir {
        Some(dir) => Engine::persistent(config.cache.clone(), dir),
        None => {
            tracing::warn!("no cache directory available, caching in memory only");
            Engine::new(TranspileCache::in_memory(config.cache.clone()))
        }
    }
}

fn exit_code(outcome: RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Failed => ExitCode::FAILURE,
        RunOutcome::Cancelled => ExitCode::from(130),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case::defaults(vec!["livejs", "run", "a.js"], TransformOptions::default())]
    #[case::flags(
        vec!["livejs", "run", "--loop-protection", "--magic-comments", "--no-top-level-results", "--log-level", "debug", "a.js"],
        TransformOptions {
            show_top_level_results: false,
            loop_protection: true,
            magic_comments: true,
            show_undefined: false,
            internal_log_level: LogLevel::Debug,
        }
    )]
    #[case::show_undefined(
        vec!["livejs", "transform", "--show-undefined"],
        TransformOptions { show_undefined: true, ..Default::default() }
    )]
    fn test_transform_options(#[case] args: Vec<&str>, #[case] expected: TransformOptions) {
        let options = match Cli::parse_from(args).commands {
            Commands::Run { options, .. } | Commands::Transform { options, .. } => options,
            other => panic!("Unexpected command {:?}", other),
        };

        assert_eq!(options.transform_options(), expected);
        assert_eq!(options.run_options().show_undefined, expected.show_undefined);
    }

    #[rstest]
    #[case::run("run")]
    #[case::transform("transform")]
    #[case::repl("repl")]
    fn test_magic_comments_help_is_additive(#[case] subcommand: &str) {
        use clap::CommandFactory;
        let command = Cli::command();
        let help = command
            .find_subcommand(subcommand)
            .and_then(|command| command.get_arguments().find(|arg| arg.get_id() == "magic_comments"))
            .and_then(|arg| arg.get_help())
            .map(|help| help.to_string())
            .unwrap_or_default();

        assert!(help.starts_with("Also report"), "unexpected help: {}", help);
    }

    #[test]
    fn test_invalid_log_level() {
        assert!(Cli::try_parse_from(["livejs", "run", "--log-level", "loud", "a.js"]).is_err());
    }

    #[rstest]
    #[case::completed(RunOutcome::Completed, ExitCode::SUCCESS)]
    #[case::failed(RunOutcome::Failed, ExitCode::FAILURE)]
    #[case::cancelled(RunOutcome::Cancelled, ExitCode::from(130))]
    fn test_exit_code(#[case] outcome: RunOutcome, #[case] expected: ExitCode) {
        assert_eq!(format!("{:?}", exit_code(outcome)), format!("{:?}", expected));
    }
}
