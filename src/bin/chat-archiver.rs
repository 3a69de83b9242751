//! CLI binary for chat-archiver.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ArchiveConfig` / `PageRequest` and prints the outcome.

use anyhow::{bail, Context, Result};
use chat_archiver::{
    append_page, compose_html, inspect, AppendProgressCallback, ArchiveConfig, PageRequest,
    ProgressCallback, RasterizerConfig, Stage,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that shows the current stage and logs each finished one.
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
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Compose => "Composing",
        Stage::Rasterize => "Rasterizing",
        Stage::Merge => "Merging",
    }
}

impl AppendProgressCallback for CliProgressCallback {
    fn on_append_start(&self, archive: &Path) {
        self.bar.set_message(archive.display().to_string());
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage_label(stage));
    }

    fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_append_error(&self, stage: Option<Stage>, error: &str) {
        self.bar.finish_and_clear();
        let stage = stage.map(|s| s.to_string()).unwrap_or_else(|| "setup".into());
        eprintln!("  {} {:<10} {}", red("✗"), stage, red(error));
    }

    fn on_append_complete(&self, page_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} archive now has {} page(s)",
            green("✔"),
            bold(&page_count.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Append a question and answer
  chat-archiver --archive chat.pdf --user "What is Rust?" --model-file answer.md

  # Pipe the model response from another tool
  llm "explain lifetimes" | chat-archiver --archive chat.pdf --user "lifetimes?" --model-file -

  # Attach screenshots after the text
  chat-archiver --archive chat.pdf --user "see plot" --image plot.png --image table.jpg

  # Preview the composed HTML without rendering
  chat-archiver --archive chat.pdf --model-file answer.md --html-only preview.html

  # Custom rasterizer (placeholders are substituted per call)
  chat-archiver --archive chat.pdf --user hi \
      --rasterizer chromium --rasterizer-arg=--headless \
      --rasterizer-arg=--print-to-pdf={pdf} --rasterizer-arg={html}

  # Archive facts
  chat-archiver --archive chat.pdf --inspect-only --json

RASTERIZER:
  The default rasterizer is `node <crate>/scripts/generate_pdf.js {html} {pdf}`
  (Puppeteer), run from the directory the binary was built from. Install it
  once with `npm install` inside scripts/. A binary installed with
  `cargo install` still points into that checkout; if it is gone, pass
  --rasterizer and --rasterizer-arg explicitly.

ENVIRONMENT VARIABLES:
  CHAT_ARCHIVER_ARCHIVE        Archive path
  CHAT_ARCHIVER_RASTERIZER     Rasterizer program
  CHAT_ARCHIVER_RASTERIZER_DIR Working directory for the rasterizer
  CHAT_ARCHIVER_TIMEOUT        Rasterizer timeout in seconds
  CHAT_ARCHIVER_STYLESHEET     Stylesheet override
  CHAT_ARCHIVER_SCRATCH_DIR    Parent directory for scratch files
  CHAT_ARCHIVER_THEME          syntect theme for code blocks
  RUST_LOG                     Override log filtering
"#;

/// Append formatted conversation pages to a PDF archive.
#[derive(Parser, Debug)]
#[command(
    name = "chat-archiver",
    version,
    about = "Append formatted conversation pages to a PDF archive",
    long_about = "Render a user message, a model response and optional images as one styled \
page (Markdown, highlighted code, MathJax math) via a headless browser, and append it to a \
PDF archive. The archive is created on first use and never left half-written.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF archive to append to (created if missing).
    #[arg(short, long, env = "CHAT_ARCHIVER_ARCHIVE")]
    archive: PathBuf,

    /// User message text (Markdown).
    #[arg(short, long, conflicts_with = "user_file")]
    user: Option<String>,

    /// Read the user message from a file (`-` for stdin).
    #[arg(long)]
    user_file: Option<PathBuf>,

    /// Model response text (Markdown).
    #[arg(short, long, conflicts_with = "model_file")]
    model: Option<String>,

    /// Read the model response from a file (`-` for stdin).
    #[arg(long)]
    model_file: Option<PathBuf>,

    /// Image to embed after the text; repeat for several.
    #[arg(short, long = "image")]
    images: Vec<PathBuf>,

    /// Omit the section headings.
    #[arg(long, env = "CHAT_ARCHIVER_NO_HEADINGS")]
    no_headings: bool,

    /// Heading above the user message.
    #[arg(long, env = "CHAT_ARCHIVER_USER_HEADING", default_value = chat_archiver::request::DEFAULT_USER_HEADING)]
    user_heading: String,

    /// Heading above the model response.
    #[arg(long, env = "CHAT_ARCHIVER_MODEL_HEADING", default_value = chat_archiver::request::DEFAULT_MODEL_HEADING)]
    model_heading: String,

    /// Rasterizer program.
    #[arg(long, env = "CHAT_ARCHIVER_RASTERIZER")]
    rasterizer: Option<String>,

    /// Rasterizer argument; repeat for several. Replaces the default
    /// argument list. Must include `{html}` and `{pdf}`.
    #[arg(long = "rasterizer-arg", allow_hyphen_values = true)]
    rasterizer_args: Vec<String>,

    /// Working directory for the rasterizer process.
    #[arg(long, env = "CHAT_ARCHIVER_RASTERIZER_DIR")]
    rasterizer_dir: Option<PathBuf>,

    /// Rasterizer timeout in seconds.
    #[arg(long, env = "CHAT_ARCHIVER_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// CSS file replacing the built-in stylesheet.
    #[arg(long, env = "CHAT_ARCHIVER_STYLESHEET")]
    stylesheet: Option<PathBuf>,

    /// Parent directory for per-invocation scratch files.
    #[arg(long, env = "CHAT_ARCHIVER_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// syntect theme for code blocks.
    #[arg(long, env = "CHAT_ARCHIVER_THEME", default_value = chat_archiver::config::DEFAULT_CODE_THEME)]
    theme: String,

    /// Do not reference web fonts or MathJax from their CDNs.
    #[arg(long, env = "CHAT_ARCHIVER_OFFLINE")]
    offline: bool,

    /// Write the composed HTML here instead of appending.
    #[arg(long, conflicts_with = "inspect_only")]
    html_only: Option<PathBuf>,

    /// Print archive facts only, append nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Print the result as JSON.
    #[arg(long, env = "CHAT_ARCHIVER_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CHAT_ARCHIVER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CHAT_ARCHIVER_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "CHAT_ARCHIVER_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.archive)
            .await
            .context("Failed to inspect archive")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize archive info")?
            );
        } else {
            println!("File:         {}", info.path.display());
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Size:         {} bytes", info.file_size_bytes);
        }
        return Ok(());
    }

    // ── Build request ────────────────────────────────────────────────────
    let request = build_request(&cli)?;
    if request.is_blank() {
        bail!("Nothing to archive: give a user message, a model response or an image");
    }

    // ── HTML preview mode ────────────────────────────────────────────────
    if let Some(ref out) = cli.html_only {
        let config = build_config(&cli, None)?;
        let html = compose_html(&request, &config)
            .await
            .context("Failed to compose page")?;
        tokio::fs::write(out, &html)
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} wrote {} ({} bytes)",
                green("✔"),
                bold(&out.display().to_string()),
                html.len()
            );
        }
        return Ok(());
    }

    // ── Append ───────────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AppendProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let outcome = append_page(&request, &cli.archive, &config)
        .await
        .context("Append failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} {}  {} page(s)  {}ms",
            green("✔"),
            if outcome.created { "created" } else { "appended to" },
            bold(&outcome.archive_path.display().to_string()),
            outcome.page_count,
            outcome.stats.total_duration_ms,
        );
        if !show_progress {
            eprintln!(
                "   {}",
                dim(&format!(
                    "compose {}ms / rasterize {}ms / merge {}ms, {} image(s)",
                    outcome.stats.compose_duration_ms,
                    outcome.stats.rasterize_duration_ms,
                    outcome.stats.merge_duration_ms,
                    outcome.stats.image_count,
                ))
            );
        }
    }

    Ok(())
}

/// Map CLI args to `PageRequest`. Texts are trimmed.
fn build_request(cli: &Cli) -> Result<PageRequest> {
    if cli.user_file.as_deref() == Some(Path::new("-"))
        && cli.model_file.as_deref() == Some(Path::new("-"))
    {
        bail!("Only one of --user-file and --model-file can read stdin");
    }
    let user = read_text(cli.user.as_deref(), cli.user_file.as_deref())?;
    let model = read_text(cli.model.as_deref(), cli.model_file.as_deref())?;

    Ok(PageRequest::new(user.trim(), model.trim())
        .images(cli.images.iter().cloned())
        .show_headings(!cli.no_headings)
        .headings(cli.user_heading.clone(), cli.model_heading.clone()))
}

/// Inline text wins; otherwise read the file, with `-` meaning stdin.
fn read_text(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = inline {
        return Ok(text.to_string());
    }
    match file {
        Some(path) if path == Path::new("-") => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(String::new()),
    }
}

/// Map CLI args to `ArchiveConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ArchiveConfig> {
    let mut rasterizer = RasterizerConfig::default().timeout_secs(cli.timeout);
    if let Some(ref program) = cli.rasterizer {
        rasterizer.program = program.clone();
        rasterizer.working_dir = None;
    }
    if !cli.rasterizer_args.is_empty() {
        rasterizer.args = cli.rasterizer_args.clone();
    }
    if let Some(ref dir) = cli.rasterizer_dir {
        rasterizer = rasterizer.working_dir(dir);
    }

    let mut builder = ArchiveConfig::builder()
        .rasterizer(rasterizer)
        .code_theme(cli.theme.clone())
        .external_assets(!cli.offline);

    if let Some(ref css) = cli.stylesheet {
        builder = builder.stylesheet_path(css);
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
