use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tracealign::alignment::{AlignmentEngine, EngineOptions, DEFAULT_MAX_CONCURRENCY};
use tracealign::annotation::{AnnotationParser, ParserOptions, DEFAULT_MAX_WORKERS};
use tracealign::cli::{Cli, Command, OutputFormat, EXIT_ERROR, EXIT_OK, EXIT_VALIDATION_FAILED};
use tracealign::evaluator::{AssertionEvaluator, EvaluatorOptions};
use tracealign::trace_ingest::TraceIngestor;
use tracealign::trace_store::TraceStore;
use tracealign::{human_output, json_output};

fn main() {
    let args = Cli::parse();
    init_logging(args.verbose, args.quiet);

    match run(args.command) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

/// RUST_LOG wins; otherwise verbosity flags pick the level
fn init_logging(verbose: u8, quiet: bool) {
    let fallback = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Align {
            sources,
            trace,
            format,
            workers,
            no_cache,
            fail_on_missing,
            metrics,
            timeout_secs,
            max_depth,
        } => {
            let parser = AnnotationParser::with_options(ParserOptions {
                max_workers: workers.unwrap_or(DEFAULT_MAX_WORKERS),
                use_cache: !no_cache,
                ..ParserOptions::default()
            });
            let parse_result = parser
                .parse_directory(&sources)
                .with_context(|| format!("scanning {}", sources.display()))?;

            let trace_data = TraceIngestor::new()
                .ingest_file(&trace)
                .with_context(|| format!("ingesting {}", trace.display()))?;
            let store = TraceStore::with_data(trace_data);

            let evaluator = AssertionEvaluator::with_options(EvaluatorOptions {
                timeout: std::time::Duration::from_secs(timeout_secs),
                max_depth,
                ..EvaluatorOptions::default()
            });
            let engine = AlignmentEngine::with_options(EngineOptions {
                max_concurrency: workers.unwrap_or(DEFAULT_MAX_CONCURRENCY),
                skip_missing_spans: !fail_on_missing,
                collect_metrics: metrics,
                ..EngineOptions::default()
            })
            .with_evaluator(evaluator);

            let report = engine.align(&parse_result.specs, &store)?;
            let rendered = match format {
                OutputFormat::Human => human_output::render_report(&report, &parse_result.errors),
                OutputFormat::Json => json_output::render_report(&report, &parse_result.errors)
                    .context("serializing report")?,
            };
            print!("{rendered}");

            Ok(if report.has_failures() {
                EXIT_VALIDATION_FAILED
            } else {
                EXIT_OK
            })
        }

        Command::Parse {
            sources,
            format,
            workers,
        } => {
            let parser = AnnotationParser::with_options(ParserOptions {
                max_workers: workers.unwrap_or(DEFAULT_MAX_WORKERS),
                ..ParserOptions::default()
            });
            let parse_result = parser
                .parse_directory(&sources)
                .with_context(|| format!("scanning {}", sources.display()))?;

            let rendered = match format {
                OutputFormat::Human => {
                    human_output::render_parse_summary(&parse_result.specs, &parse_result.errors)
                }
                OutputFormat::Json => json_output::render_parse_result(&parse_result)
                    .context("serializing parse result")?,
            };
            print!("{rendered}");

            Ok(if parse_result.has_errors() {
                EXIT_VALIDATION_FAILED
            } else {
                EXIT_OK
            })
        }

        Command::Trace { trace, format } => {
            let trace_data = TraceIngestor::new()
                .ingest_file(&trace)
                .with_context(|| format!("ingesting {}", trace.display()))?;
            let store = TraceStore::with_data(trace_data);

            let rendered = match format {
                OutputFormat::Human => human_output::render_trace_summary(&store),
                OutputFormat::Json => {
                    json_output::render_trace(&store).context("serializing trace")?
                }
            };
            print!("{rendered}");
            Ok(EXIT_OK)
        }
    }
}
