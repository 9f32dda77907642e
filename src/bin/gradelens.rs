//! CLI binary for gradelens.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gradelens::output::format_number;
use gradelens::pipeline::render::render_blocking_safe;
use gradelens::{
    grade_for, renderer_for, resolve_upload, write_report, AnalysisConfig, AnalysisOutcome,
    AnalysisRecord, NarrativeMode, NarrativeSource, PipelineProgressCallback, ProgressCallback,
    ReportFormat, ReportPipeline, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner for the running stage plus a log line per
/// finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.set_message("Opening report card…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<26} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar
            .println(format!("  {} {:<26} {}", red("✗"), stage.to_string(), red(first_line)));
    }

    fn on_fallback_used(&self, reason: &str) {
        let first_line = reason.lines().next().unwrap_or(reason);
        self.bar.println(format!(
            "  {} using fallback feedback: {}",
            yellow("⚠"),
            dim(first_line)
        ));
    }

    fn on_pipeline_complete(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a report card and print a summary
  gradelens analyze report_card.pdf

  # Analyse and save the downloadable PDF report
  gradelens analyze report_card.pdf -o Emma_Johnson_Report.pdf

  # Machine-readable result; keep it to re-render later
  gradelens analyze --json report_card.pdf > analysis.json
  gradelens render analysis.json -o report.txt --format text

  # Never fail on the narrative step (fallback feedback is flagged)
  gradelens analyze --mode resilient report_card.pdf

  # Letter grade for a percentage
  gradelens grade 84.5

  # HTTP API on port 8080
  gradelens serve --port 8080

GRADES:
  ≥95 A+   ≥85 A   ≥75 B+   ≥65 B   ≥55 C+   ≥45 C   ≥35 D   else F

ENVIRONMENT VARIABLES:
  PERPLEXITY_API_KEY      Perplexity API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_PROVIDER      Provider for --provider (perplexity, openai, anthropic, gemini, ollama)
  EDGEQUAKE_LLM_PROVIDER  Library-level provider override (used with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Analyse student report cards with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "gradelens",
    version,
    about = "Analyse student report cards: grades, feedback and a downloadable report",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "GRADELENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true, env = "GRADELENS_QUIET")]
    quiet: bool,

    /// Path to the pdfium library (file or directory).
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a report card (local PDF or URL).
    Analyze(AnalyzeArgs),

    /// Re-render a saved analysis (record or `--json` outcome).
    Render {
        /// JSON file holding an AnalysisRecord or AnalysisOutcome.
        record: PathBuf,

        /// Write the report here (default: <Student_Name>_Report.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format.
        #[arg(long, value_enum, env = "GRADELENS_FORMAT", default_value = "pdf")]
        format: FormatArg,
    },

    /// Print the letter grade for a percentage.
    Grade {
        #[arg(allow_negative_numbers = true)]
        percentage: f64,
    },

    /// Serve the HTTP API.
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "GRADELENS_PORT", default_value_t = 8080)]
        port: u16,

        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Also write the rendered report to this file.
    #[arg(short, long, env = "GRADELENS_OUTPUT")]
    output: Option<PathBuf>,

    /// Report format for --output (default: from the file extension, else pdf).
    #[arg(long, value_enum, env = "GRADELENS_FORMAT")]
    format: Option<FormatArg>,

    /// Print the AnalysisOutcome as JSON instead of a summary.
    #[arg(long, env = "GRADELENS_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "GRADELENS_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "GRADELENS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    model: ModelArgs,
}

/// Flags shared by every command that calls the model.
#[derive(clap::Args, Debug, Clone)]
struct ModelArgs {
    /// LLM model ID (default: sonar-pro).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: perplexity, openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Narrative failure policy.
    #[arg(long, value_enum, env = "GRADELENS_MODE", default_value = "strict")]
    mode: ModeArg,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "GRADELENS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "GRADELENS_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Maximum upload size in bytes.
    #[arg(long, env = "GRADELENS_MAX_UPLOAD", default_value_t = gradelens::config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload: usize,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pdf,
    Text,
}

impl From<FormatArg> for ReportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Pdf => ReportFormat::Pdf,
            FormatArg::Text => ReportFormat::Text,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Strict,
    Resilient,
}

impl From<ModeArg> for NarrativeMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Strict => NarrativeMode::Strict,
            ModeArg::Resilient => NarrativeMode::Resilient,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // stage lines provide the feedback that matters.
    let show_progress = match &cli.command {
        Command::Analyze(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Analyze(ref args) => run_analyze(&cli, args, show_progress).await,
        Command::Render {
            ref record,
            ref output,
            format,
        } => run_render(&cli, record, output.as_deref(), format.into()).await,
        Command::Grade { percentage } => {
            println!("{}", grade_for(percentage));
            Ok(())
        }
        #[cfg(feature = "server")]
        Command::Serve { port, ref model } => {
            let config = build_config(&cli, model, None)?;
            let pipeline =
                ReportPipeline::from_config(config).context("Failed to set up the pipeline")?;
            if !cli.quiet {
                eprintln!("{} http://localhost:{port}", bold("Serving on"));
                eprintln!("  GET  /health");
                eprintln!("  POST /api/analyze   {{ fileName, mimeType, content (base64) }}");
                eprintln!("  POST /api/report    AnalysisRecord JSON");
            }
            gradelens::server::run_server(pipeline, port)
                .await
                .with_context(|| format!("Server on port {port} failed"))
        }
    }
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(
    cli: &Cli,
    model: &ModelArgs,
    progress: Option<ProgressCallback>,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .narrative_mode(model.mode.into())
        .api_timeout_secs(model.api_timeout)
        .temperature(model.temperature)
        .max_upload_bytes(model.max_upload);

    if let Some(ref m) = model.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = model.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn run_analyze(cli: &Cli, args: &AnalyzeArgs, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let mut config = build_config(cli, &args.model, progress)?;
    config.download_timeout_secs = args.download_timeout;

    let upload = resolve_upload(&args.input, &config)
        .await
        .context("Failed to read the report card")?;
    let pipeline = ReportPipeline::from_config(config).context("Failed to set up the pipeline")?;
    let result = pipeline.build_analysis(&upload).await;

    if args.json {
        let outcome = AnalysisOutcome::from(result);
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
        if !outcome.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let record = result.context("Analysis failed")?;
    if !cli.quiet {
        print_summary(&record);
    }

    if let Some(ref path) = args.output {
        let format = args
            .format
            .map(ReportFormat::from)
            .unwrap_or_else(|| format_from_extension(path));
        let report = pipeline
            .render_report(&record, format)
            .await
            .context("Failed to render the report")?;
        write_report(&report, path).await?;
        if !cli.quiet {
            eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
        }
    }
    Ok(())
}

async fn run_render(
    cli: &Cli,
    record_path: &Path,
    output: Option<&Path>,
    format: ReportFormat,
) -> Result<()> {
    let json = tokio::fs::read_to_string(record_path)
        .await
        .with_context(|| format!("Failed to read {}", record_path.display()))?;
    let mut record = parse_saved_record(&json)
        .with_context(|| format!("{} holds no analysis", record_path.display()))?;
    record.regrade();
    record.validate()?;

    let mut builder = AnalysisConfig::builder();
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path.clone());
    }
    let config = builder.build()?;

    let report = render_blocking_safe(renderer_for(format, &config), record)
        .await
        .context("Failed to render the report")?;
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&report.file_name));
    write_report(&report, &path).await?;
    if !cli.quiet {
        eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

/// Accept either a bare record or the `--json` outcome wrapping one.
fn parse_saved_record(json: &str) -> Result<AnalysisRecord> {
    if let Ok(record) = serde_json::from_str::<AnalysisRecord>(json) {
        return Ok(record);
    }
    let outcome: AnalysisOutcome =
        serde_json::from_str(json).context("Not an AnalysisRecord or AnalysisOutcome")?;
    outcome
        .data
        .ok_or_else(|| anyhow::anyhow!("outcome has no data: {}", outcome.error.unwrap_or_default()))
}

fn format_from_extension(path: &Path) -> ReportFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => ReportFormat::Text,
        _ => ReportFormat::Pdf,
    }
}

fn print_summary(record: &AnalysisRecord) {
    println!("{}", bold(&record.student_name));
    println!(
        "  {}",
        dim(&format!(
            "Roll {} · {} · {} · Attendance {} · Behaviour {}",
            record.roll_number, record.class, record.term, record.attendance, record.behaviour
        ))
    );
    println!(
        "  Overall {}% → {}",
        format_number(record.overall_percentage),
        bold(&record.overall_grade)
    );
    println!();
    for s in &record.subjects {
        println!(
            "  {:<24} {:>7}/{:<5} {:>4}%  {}",
            s.name,
            format_number(s.marks_obtained),
            format_number(s.max_marks),
            s.percentage().round(),
            cyan(&s.grade)
        );
    }

    for (title, items) in [
        ("Strengths", &record.strengths),
        ("Areas for improvement", &record.improvements),
        ("Recommendations", &record.recommendations),
    ] {
        println!();
        println!("{}", bold(title));
        for (i, item) in items.iter().enumerate() {
            println!("  {}. {}", i + 1, item);
        }
    }

    if record.narrative_source == NarrativeSource::Fallback {
        println!();
        println!(
            "{}",
            yellow("Note: feedback above was generated from the marks; the AI analysis was unavailable.")
        );
    }
}
