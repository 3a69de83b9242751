//! External rasterizer boundary: composed HTML file → single-page PDF file.
//!
//! The rasterizer is an out-of-process headless browser (by default
//! `node <crate>/scripts/generate_pdf.js {html} {pdf}`). It runs as a
//! `tokio::process` child with a wall-clock timeout. On Unix the child leads
//! its own process group, so on expiry the browser it launched is killed
//! along with it and the attempt fails. Output is accepted only when the process
//! exits with status zero *and* a non-empty file exists at the `{pdf}` path.
//!
//! Every invocation gets its own [`Scratch`] directory, so concurrent
//! appends never share transient files.

use crate::config::RasterizerConfig;
use crate::error::{ArchiveError, CleanupWarning, RasterizationError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Longest stderr excerpt kept in an error message.
const STDERR_TAIL_CHARS: usize = 2000;

/// Per-invocation scratch directory holding the transient HTML and page PDF.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
    html: PathBuf,
    page: PathBuf,
}

impl Scratch {
    /// Create a fresh, uniquely named directory under `base` (or the system
    /// temp dir).
    pub fn create(base: Option<&Path>) -> Result<Self, ArchiveError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("chat-archiver-");
        let dir = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(|source| ArchiveError::Scratch { source })?;

        let html = dir.path().join("page.html");
        let page = dir.path().join("page.pdf");
        debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir, html, page })
    }

    pub fn html_path(&self) -> &Path {
        &self.html
    }

    pub fn page_path(&self) -> &Path {
        &self.page
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything left in it.
    pub fn close(self) -> Result<(), CleanupWarning> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| CleanupWarning { path, source })
    }
}

/// Delete one transient file. A file that is already gone is fine.
pub fn remove_transient(path: &Path) -> Result<(), CleanupWarning> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanupWarning {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Run the rasterizer on `html_path`, expecting a PDF at `pdf_path`.
///
/// The HTML input is deleted before returning, on success and failure alike.
pub async fn rasterize(
    config: &RasterizerConfig,
    html_path: &Path,
    pdf_path: &Path,
) -> Result<(), RasterizationError> {
    let result = run_process(config, html_path, pdf_path).await;
    if let Err(warning) = remove_transient(html_path) {
        warn!("{}", warning);
    }
    result
}

async fn run_process(
    config: &RasterizerConfig,
    html_path: &Path,
    pdf_path: &Path,
) -> Result<(), RasterizationError> {
    let program = config.program.clone();
    let args = config.expand_args(html_path, pdf_path);
    info!("Rasterizing with: {} {}", program, args.join(" "));

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(ref dir) = config.working_dir {
        if !dir.is_dir() {
            return Err(RasterizationError::WorkingDirMissing { dir: dir.clone() });
        }
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            RasterizationError::ExecutableNotFound {
                program: program.clone(),
            }
        } else {
            RasterizationError::SpawnFailed {
                program: program.clone(),
                source,
            }
        }
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let timeout = Duration::from_secs(config.timeout_secs);
    let waited = tokio::time::timeout(timeout, async {
        let (status, _, stderr) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
        status.map(|status| (status, stderr))
    })
    .await;

    let (status, stderr) = match waited {
        Ok(result) => result.map_err(|source| RasterizationError::Wait {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            warn!("Rasterizer timed out after {}s", config.timeout_secs);
            kill_process_tree(&mut child).await;
            return Err(RasterizationError::TimedOut {
                program,
                secs: config.timeout_secs,
            });
        }
    };

    if !status.success() {
        return Err(RasterizationError::ExitFailure {
            program,
            status: status.to_string(),
            stderr: stderr_tail(&stderr),
        });
    }

    match tokio::fs::metadata(pdf_path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {
            debug!("Rasterizer wrote {} bytes", meta.len());
            Ok(())
        }
        _ => Err(RasterizationError::MissingOutput {
            path: pdf_path.to_path_buf(),
        }),
    }
}

/// Read a child pipe to the end. Read errors just end the capture.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Stopped reading rasterizer output: {}", e);
        }
    }
    buf
}

/// Kill the child and, on Unix, every process in its group.
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let group = format!("-{pid}");
        match Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => debug!("Killed process group {}", pid),
            Ok(status) => warn!("Could not kill process group {}: kill exited with {}", pid, status),
            Err(e) => warn!("Could not kill process group {}: {}", pid, e),
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("Rasterizer already exited: {}", e);
    }
    if let Err(e) = child.wait().await {
        debug!("Could not reap rasterizer: {}", e);
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("\u{2026}{tail}")
}
