mod config;
mod document;
mod error;
mod generate;
mod logging;
mod model;
mod prompt;
mod shape;
mod templates;
mod validators;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info};

use crate::config::{Config, LoadedConfig};
use crate::error::GenerateError;
use crate::generate::{GenerateRequest, Output};
use crate::model::GeminiModel;
use crate::shape::{ValidationPolicy, ValidationReport};
use crate::templates::FileOutcome;

/// Fill a YAML specification template from free-text requirements.
#[derive(Debug, Parser)]
#[command(name = "specgen", version, about)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level written to the log file (overridden by SPECGEN_LOG).
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the model to fill the template and write the result.
    Generate(GenerateArgs),
    /// Print the prompt that would be sent, without calling the model.
    Prompt(InputArgs),
    /// Check an existing document against a template.
    Check(CheckArgs),
    /// Write a starter requirements file and template.
    Init(InitArgs),
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Requirements text file.
    #[arg(short, long, value_name = "PATH")]
    requirements: Option<PathBuf>,

    /// YAML template file.
    #[arg(short, long, value_name = "PATH")]
    template: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Where to write the filled-in specification.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Gemini model name.
    #[arg(long)]
    model: Option<String>,

    /// Keep the document even when it does not match the template.
    #[arg(long)]
    lenient: bool,

    /// Print the document to stdout instead of writing the output file.
    #[arg(long)]
    stdout: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// YAML template file.
    #[arg(short, long, value_name = "PATH")]
    template: Option<PathBuf>,

    /// Document to check.
    #[arg(short, long, value_name = "PATH")]
    document: PathBuf,

    /// Report violations but exit successfully.
    #[arg(long)]
    lenient: bool,
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Directory to write the starter files into.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Overwrite files that already exist.
    #[arg(long)]
    force: bool,
}

/// Apply command-line input paths on top of the loaded config.
fn apply_inputs(config: &mut Config, inputs: &InputArgs) {
    if let Some(path) = &inputs.requirements {
        config.paths.requirements = path.display().to_string();
    }
    if let Some(path) = &inputs.template {
        config.paths.template = path.display().to_string();
    }
}

fn apply_generate_args(config: &mut Config, args: &GenerateArgs) {
    apply_inputs(config, &args.inputs);
    if let Some(path) = &args.output {
        config.paths.output = path.display().to_string();
    }
    if let Some(model) = &args.model {
        config.gemini.model = model.clone();
    }
    if args.lenient {
        config.validation.strict = false;
    }
}

/// Print preflight problems; returns false if any were found.
fn report_preflight(inputs: &[(&'static str, &Path)], output: Option<&Path>) -> bool {
    let problems = validators::preflight(inputs, output);
    for problem in &problems {
        eprintln!("Error: {} {}: {}", problem.label, problem.path, problem.message);
    }
    problems.is_empty()
}

fn print_report(report: &ValidationReport) {
    for violation in &report.violations {
        eprintln!("  - {}", violation);
    }
}

fn print_failure(err: &GenerateError) {
    eprintln!("Error: {}", err);
    if let GenerateError::Shape { violations, .. } = err {
        for violation in violations {
            eprintln!("  - {}", violation);
        }
    }
    if let Some(raw) = err.raw_output() {
        eprintln!("---- Raw model output ----");
        eprintln!("{}", raw);
        eprintln!("---- End raw output ----");
    }
}

fn run_generate(mut config: Config, args: &GenerateArgs) -> Result<ExitCode> {
    apply_generate_args(&mut config, args);

    let request = GenerateRequest::from_config(&config);
    let output = config.output_path();
    let output_check = (!args.stdout).then_some(output.as_path());
    if !report_preflight(
        &[
            ("requirements", request.requirements.as_path()),
            ("template", request.template.as_path()),
        ],
        output_check,
    ) {
        return Ok(ExitCode::FAILURE);
    }

    let model = match config::resolve_api_key(&config)
        .and_then(|key| GeminiModel::new(&config.gemini, key))
    {
        Ok(model) => model,
        Err(e) => {
            error!(error = %e, "model_setup_failed");
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut stdout = io::stdout().lock();
    let destination = if args.stdout {
        Output::Stream(&mut stdout)
    } else {
        Output::File(&output)
    };
    let generated = match generate::generate_to(&request, &model, destination) {
        Ok(generated) => generated,
        Err(e) => {
            error!(error = %e, "generation_failed");
            print_failure(&e);
            eprintln!("\nSpecification generation failed.");
            return Ok(ExitCode::FAILURE);
        }
    };

    if !generated.report.is_empty() {
        eprintln!(
            "Warning: document does not match the template ({} violation(s)):",
            generated.report.len()
        );
        print_report(&generated.report);
    }

    if !args.stdout {
        println!("Specification saved to '{}'.", output.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_prompt(mut config: Config, args: &InputArgs) -> Result<ExitCode> {
    apply_inputs(&mut config, args);
    let request = GenerateRequest::from_config(&config);
    match generate::prepare(&request) {
        Ok(prepared) => {
            print!("{}", prepared.prompt);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_failure(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_check(mut config: Config, args: &CheckArgs) -> Result<ExitCode> {
    if args.lenient {
        config.validation.strict = false;
    }
    let template = args
        .template
        .clone()
        .unwrap_or_else(|| config.template_path());
    let report = match generate::check_document(&template, &args.document) {
        Ok(report) => report,
        Err(e) => {
            print_failure(&e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if report.is_conforming() {
        println!("{} matches {}", args.document.display(), template.display());
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!(
        "{} does not match {} ({} violation(s)):",
        args.document.display(),
        template.display(),
        report.len()
    );
    print_report(&report);
    match ValidationPolicy::from_strict(config.validation.strict) {
        ValidationPolicy::Strict => Ok(ExitCode::FAILURE),
        ValidationPolicy::Lenient => Ok(ExitCode::SUCCESS),
    }
}

fn run_init(args: &InitArgs) -> Result<ExitCode> {
    let outcomes = templates::write_starter_files(&args.dir, args.force)
        .with_context(|| format!("Failed to write starter files to {}", args.dir.display()))?;
    for outcome in outcomes {
        match outcome {
            FileOutcome::Written(path) => println!("Wrote {}", path.display()),
            FileOutcome::Skipped(path) => {
                println!("Skipped {} (exists, use --force to overwrite)", path.display())
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let start_time = Instant::now();

    // Initialize logging before anything else
    let (session_id, _guard) = match logging::init(&cli.log_level) {
        Ok(ctx) => {
            logging::cleanup_old_logs(&ctx.log_directory);
            (Some(ctx.session_id), Some(ctx._guard))
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            (None, None)
        }
    };

    let LoadedConfig {
        config,
        config_path,
        project_config_path,
        status,
    } = config::load_config(cli.config.as_deref());
    debug!(
        config_path = %config_path.display(),
        project_config_path = ?project_config_path,
        status = ?status,
        "config_loaded"
    );

    let result = match &cli.command {
        Command::Generate(args) => run_generate(config, args),
        Command::Prompt(args) => run_prompt(config, args),
        Command::Check(args) => run_check(config, args),
        Command::Init(args) => run_init(args),
    };

    if let Some(sid) = session_id {
        info!(
            session_id = %sid,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "session_end"
        );
    }

    result
}
