//! Configuration types for appending pages to an archive.
//!
//! All pipeline behaviour is controlled through [`ArchiveConfig`], built via
//! its [`ArchiveConfigBuilder`]. The external rasterizer has its own
//! [`RasterizerConfig`] nested inside.

use crate::error::ArchiveError;
use crate::pipeline::highlight;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the transient HTML input path.
pub const HTML_PLACEHOLDER: &str = "{html}";
/// Placeholder replaced by the transient PDF output path.
pub const PDF_PLACEHOLDER: &str = "{pdf}";

/// Directory this crate was built from; the default rasterizer runs here.
pub const CRATE_DIR: &str = env!("CARGO_MANIFEST_DIR");

/// Reference Puppeteer script shipped with the crate, as an absolute path.
///
/// The path is fixed at compile time. A binary installed with
/// `cargo install` keeps pointing into the source checkout it was built
/// from; when that checkout is gone, configure the rasterizer explicitly.
pub const DEFAULT_SCRIPT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/generate_pdf.js");

/// Default syntect theme used for code-block colours.
pub const DEFAULT_CODE_THEME: &str = "InspiredGitHub";

/// Configuration for one or many page appends.
///
/// # Example
/// ```rust
/// use chat_archiver::{ArchiveConfig, RasterizerConfig};
///
/// let config = ArchiveConfig::builder()
///     .rasterizer(RasterizerConfig::new("node").arg("render.js").arg("{html}").arg("{pdf}"))
///     .external_assets(false)
///     .build()
///     .unwrap();
/// assert!(!config.external_assets);
/// ```
#[derive(Clone)]
pub struct ArchiveConfig {
    /// How to launch the external HTML → PDF process.
    pub rasterizer: RasterizerConfig,

    /// Stylesheet override. `None` uses the stylesheet compiled into the crate.
    pub stylesheet_path: Option<PathBuf>,

    /// Parent directory for per-invocation scratch directories.
    /// `None` uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// syntect theme name for code highlighting. Default: `InspiredGitHub`.
    pub code_theme: String,

    /// Reference web fonts and MathJax from their CDNs. Default: true.
    ///
    /// The rasterizer needs network access for these to resolve. Without it
    /// the page still renders, with fallback fonts and raw TeX.
    pub external_assets: bool,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            rasterizer: RasterizerConfig::default(),
            stylesheet_path: None,
            scratch_dir: None,
            code_theme: DEFAULT_CODE_THEME.to_string(),
            external_assets: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("rasterizer", &self.rasterizer)
            .field("stylesheet_path", &self.stylesheet_path)
            .field("scratch_dir", &self.scratch_dir)
            .field("code_theme", &self.code_theme)
            .field("external_assets", &self.external_assets)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn AppendProgressCallback>"),
            )
            .finish()
    }
}

impl ArchiveConfig {
    /// Create a new builder for `ArchiveConfig`.
    pub fn builder() -> ArchiveConfigBuilder {
        ArchiveConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ArchiveConfig`].
#[derive(Debug)]
pub struct ArchiveConfigBuilder {
    config: ArchiveConfig,
}

impl ArchiveConfigBuilder {
    pub fn rasterizer(mut self, rasterizer: RasterizerConfig) -> Self {
        self.config.rasterizer = rasterizer;
        self
    }

    pub fn stylesheet_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stylesheet_path = Some(path.into());
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn code_theme(mut self, theme: impl Into<String>) -> Self {
        self.config.code_theme = theme.into();
        self
    }

    pub fn external_assets(mut self, v: bool) -> Self {
        self.config.external_assets = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ArchiveConfig, ArchiveError> {
        self.config.rasterizer.validate()?;
        if !highlight::has_theme(&self.config.code_theme) {
            return Err(ArchiveError::InvalidConfig(format!(
                "Unknown code theme '{}'. Available: {}",
                self.config.code_theme,
                highlight::theme_names().join(", ")
            )));
        }
        Ok(self.config)
    }
}

/// How to invoke the external rasterizer process.
///
/// Every argument has `{html}` and `{pdf}` replaced with the invocation's
/// transient paths before the process starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterizerConfig {
    /// Executable name or path. Default: `node`.
    pub program: String,

    /// Argument template. Default: `<crate>/scripts/generate_pdf.js {html} {pdf}`.
    pub args: Vec<String>,

    /// Working directory for the process. `None` inherits the caller's.
    /// Default: the crate directory.
    pub working_dir: Option<PathBuf>,

    /// Wall-clock limit in seconds; the process is killed on expiry. Default: 120.
    pub timeout_secs: u64,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec![
                DEFAULT_SCRIPT.to_string(),
                HTML_PLACEHOLDER.to_string(),
                PDF_PLACEHOLDER.to_string(),
            ],
            working_dir: Some(PathBuf::from(CRATE_DIR)),
            timeout_secs: 120,
        }
    }
}

impl RasterizerConfig {
    /// A rasterizer with the given program, no arguments yet, and the
    /// caller's working directory.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Substitute the transient paths into the argument template.
    pub fn expand_args(&self, html: &Path, pdf: &Path) -> Vec<String> {
        let html = html.to_string_lossy();
        let pdf = pdf.to_string_lossy();
        self.args
            .iter()
            .map(|a| {
                a.replace(HTML_PLACEHOLDER, &html)
                    .replace(PDF_PLACEHOLDER, &pdf)
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ArchiveError> {
        if self.program.trim().is_empty() {
            return Err(ArchiveError::InvalidConfig(
                "Rasterizer program must not be empty".into(),
            ));
        }
        for placeholder in [HTML_PLACEHOLDER, PDF_PLACEHOLDER] {
            if !self.args.iter().any(|a| a.contains(placeholder)) {
                return Err(ArchiveError::InvalidConfig(format!(
                    "Rasterizer arguments must contain {placeholder}"
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(ArchiveError::InvalidConfig(
                "Rasterizer timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}
