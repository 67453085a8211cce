//! # External Assembler Driver (C10, §4.10)
//!
//! Locates an ACME-compatible 6502 assembler on `$PATH` or a platform's
//! well-known install directories, then drives it (synchronously or via
//! `tokio`) against assembly text written to a scratch temp directory.
//! Grounded in the teacher's `compiler::lean::bridge::LeanBridge`: an
//! availability probe run once at construction, `Command`-based invocation,
//! structured error wrapping instead of bubbling `std::io::Error` directly.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::error::AssemblerError;

/// Output format requested from the assembler (§6 "CLI surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// C64 `.prg`: load-address header, then program bytes.
    Prg,
    /// Raw binary, no header.
    Bin,
}

impl OutputFormat {
    fn acme_format_flag(self) -> &'static str {
        match self {
            OutputFormat::Prg => "cbm",
            OutputFormat::Bin => "plain",
        }
    }
}

/// One assembler invocation's result: the assembled bytes and, if
/// requested, the label-file text ACME's `-l` option produces (§6
/// "Output: source map and debugger labels").
#[derive(Debug, Clone)]
pub struct AssembledOutput {
    /// Assembled program bytes (with or without the load-address header,
    /// depending on the requested `OutputFormat`).
    pub bytes: Vec<u8>,
    /// Label-file text, if `emit_labels` was set on the request.
    pub labels: Option<String>,
}

/// One request to assemble a source text (§4.10).
#[derive(Debug, Clone)]
pub struct AssembleRequest {
    /// ACME-syntax assembly source text.
    pub source: String,
    /// `prg` or `bin`.
    pub format: OutputFormat,
    /// Whether to ask the assembler for a label file alongside the binary.
    pub emit_labels: bool,
}

/// Platform-specific directories checked after `$PATH`, in order, for an
/// `acme` binary. The teacher's bridge only ever looks at one configured
/// path; this crate additionally searches likely install locations because
/// ACME is rarely on `$PATH` by default on any platform.
fn well_known_install_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/opt/homebrew/bin"));
        dirs.push(PathBuf::from("/usr/local/bin"));
    } else if cfg!(target_os = "windows") {
        dirs.push(PathBuf::from(r"C:\Program Files\ACME"));
        dirs.push(PathBuf::from(r"C:\acme"));
    } else {
        dirs.push(PathBuf::from("/usr/local/bin"));
        dirs.push(PathBuf::from("/usr/bin"));
        dirs.push(PathBuf::from("/opt/acme/bin"));
    }
    dirs
}

fn installation_hint() -> String {
    if cfg!(target_os = "macos") {
        "install ACME with `brew install acme`, or pass an explicit assembler path.".to_string()
    } else if cfg!(target_os = "windows") {
        "download ACME from https://sourceforge.net/projects/acme-crossass/, or pass an explicit assembler path.".to_string()
    } else {
        "install ACME via your package manager (e.g. `apt install acme`), or pass an explicit assembler path.".to_string()
    }
}

fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(p) = explicit {
        candidates.push(p.to_path_buf());
        return candidates;
    }
    candidates.push(PathBuf::from("acme"));
    for dir in well_known_install_dirs() {
        candidates.push(dir.join("acme"));
    }
    candidates
}

fn probe_available(path: &Path) -> bool {
    std::process::Command::new(path)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Drives an external 6502 assembler (C10). One instance resolves its
/// binary path once, at construction, and is cheap to reuse across many
/// `assemble`/`assemble_async` calls.
pub struct AssemblerDriver {
    resolved_path: Option<PathBuf>,
    searched: Vec<String>,
    timeout: Duration,
}

impl AssemblerDriver {
    /// Search `$PATH` and well-known install directories for `acme`.
    /// Never fails: if nothing is found, `resolved_path` stays `None` and
    /// every `assemble*` call returns `AssemblerError::NotFound`.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Like `new`, with an explicit timeout instead of the default 30s.
    pub fn with_timeout(timeout: Duration) -> Self {
        let candidates = candidate_paths(None);
        let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        let resolved_path = candidates.into_iter().find(|p| probe_available(p));
        Self {
            resolved_path,
            searched,
            timeout,
        }
    }

    /// Skip the search and use `path` directly, still probing its
    /// availability so `is_available()` is meaningful.
    pub fn with_explicit_path(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        let path = path.into();
        let available = probe_available(&path);
        let searched = vec![path.display().to_string()];
        Self {
            resolved_path: available.then_some(path),
            searched,
            timeout,
        }
    }

    /// Whether an assembler binary was found and responded successfully to
    /// `--version`.
    pub fn is_available(&self) -> bool {
        self.resolved_path.is_some()
    }

    fn require_path(&self) -> Result<&Path, AssemblerError> {
        self.resolved_path.as_deref().ok_or_else(|| AssemblerError::NotFound {
            searched: self.searched.clone(),
            hint: installation_hint(),
        })
    }

    fn scratch_dir(&self) -> Result<PathBuf, AssemblerError> {
        let dir = std::env::temp_dir().join(format!("sixtyfive-core-{}", std::process::id()));
        std::fs::create_dir_all(&dir).map_err(|e| AssemblerError::Io(e.to_string()))?;
        Ok(dir)
    }

    fn build_args(out_path: &Path, label_path: Option<&Path>, format: OutputFormat) -> Vec<String> {
        let mut args = vec!["-f".to_string(), format.acme_format_flag().to_string()];
        if let Some(lp) = label_path {
            args.push("-l".to_string());
            args.push(lp.display().to_string());
        }
        args.push("-o".to_string());
        args.push(out_path.display().to_string());
        args
    }

    /// Synchronously assemble `request.source`, blocking the calling
    /// thread. Temp-directory cleanup is best-effort and always attempted,
    /// whether assembly succeeds or fails (§4.10, §5 "Resource lifetimes").
    pub fn assemble(&self, request: &AssembleRequest) -> Result<AssembledOutput, AssemblerError> {
        let assembler_path = self.require_path()?.to_path_buf();
        let dir = self.scratch_dir()?;
        let result = self.assemble_in_dir(&assembler_path, &dir, request);
        let _ = std::fs::remove_dir_all(&dir);
        result
    }

    fn assemble_in_dir(
        &self,
        assembler_path: &Path,
        dir: &Path,
        request: &AssembleRequest,
    ) -> Result<AssembledOutput, AssemblerError> {
        let src_path = dir.join("module.asm");
        std::fs::write(&src_path, &request.source).map_err(|e| AssemblerError::Io(e.to_string()))?;

        let out_path = dir.join("module.bin");
        let label_path = request.emit_labels.then(|| dir.join("module.labels"));
        let args = Self::build_args(&out_path, label_path.as_deref(), request.format);

        let command_line = format!(
            "{} {} {}",
            assembler_path.display(),
            args.join(" "),
            src_path.display()
        );

        let mut command = std::process::Command::new(assembler_path);
        command.args(&args).arg(&src_path).stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| AssemblerError::Io(e.to_string()))?;
        let output = run_with_timeout(child, self.timeout, &command_line)?;

        self.finish(output, &out_path, label_path.as_deref(), &request.source, &command_line)
    }

    /// Asynchronously assemble `request.source` via `tokio::process`.
    /// Identical semantics to `assemble`, but the child's I/O and the
    /// timeout are driven on the async runtime instead of blocking a
    /// thread.
    pub async fn assemble_async(&self, request: &AssembleRequest) -> Result<AssembledOutput, AssemblerError> {
        let assembler_path = self.require_path()?.to_path_buf();
        let dir = self.scratch_dir()?;
        let result = self.assemble_in_dir_async(&assembler_path, &dir, request).await;
        let _ = tokio::fs::remove_dir_all(&dir).await;
        result
    }

    async fn assemble_in_dir_async(
        &self,
        assembler_path: &Path,
        dir: &Path,
        request: &AssembleRequest,
    ) -> Result<AssembledOutput, AssemblerError> {
        let src_path = dir.join("module.asm");
        tokio::fs::write(&src_path, &request.source)
            .await
            .map_err(|e| AssemblerError::Io(e.to_string()))?;

        let out_path = dir.join("module.bin");
        let label_path = request.emit_labels.then(|| dir.join("module.labels"));
        let args = Self::build_args(&out_path, label_path.as_deref(), request.format);

        let command_line = format!(
            "{} {} {}",
            assembler_path.display(),
            args.join(" "),
            src_path.display()
        );

        let mut command = tokio::process::Command::new(assembler_path);
        command.args(&args).arg(&src_path).stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| AssemblerError::Io(e.to_string()))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AssemblerError::Timeout {
                timeout_secs: self.timeout.as_secs(),
                command_line: command_line.clone(),
            })?
            .map_err(|e| AssemblerError::Io(e.to_string()))?;

        self.finish(output, &out_path, label_path.as_deref(), &request.source, &command_line)
    }

    fn finish(
        &self,
        output: std::process::Output,
        out_path: &Path,
        label_path: Option<&Path>,
        source: &str,
        command_line: &str,
    ) -> Result<AssembledOutput, AssemblerError> {
        if !output.status.success() {
            return Err(AssemblerError::AssemblyFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                source: source.to_string(),
            });
        }
        tracing::debug!(command_line, "assembler run succeeded");

        let bytes = std::fs::read(out_path).map_err(|e| AssemblerError::Io(e.to_string()))?;
        let labels = match label_path {
            Some(p) => Some(std::fs::read_to_string(p).map_err(|e| AssemblerError::Io(e.to_string()))?),
            None => None,
        };
        Ok(AssembledOutput { bytes, labels })
    }
}

impl Default for AssemblerDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Block on `child`, killing it if `timeout` elapses first (sync path;
/// `assemble_async` uses `tokio::time::timeout` instead).
fn run_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
    command_line: &str,
) -> Result<std::process::Output, AssemblerError> {
    let start = std::time::Instant::now();
    loop {
        match child.try_wait().map_err(|e| AssemblerError::Io(e.to_string()))? {
            Some(_status) => {
                return child.wait_with_output().map_err(|e| AssemblerError::Io(e.to_string()));
            }
            None => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AssemblerError::Timeout {
                        timeout_secs: timeout.as_secs(),
                        command_line: command_line.to_string(),
                    });
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_assembler_reports_searched_paths_and_hint() {
        let driver = AssemblerDriver::with_explicit_path("/nonexistent/acme-binary-xyz", Duration::from_secs(1));
        assert!(!driver.is_available());
        let request = AssembleRequest {
            source: "* = $0810\n  rts\n".to_string(),
            format: OutputFormat::Prg,
            emit_labels: false,
        };
        let err = driver.assemble(&request).unwrap_err();
        match err {
            AssemblerError::NotFound { searched, hint } => {
                assert_eq!(searched.len(), 1);
                assert!(!hint.is_empty());
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn output_format_maps_to_acme_flags() {
        assert_eq!(OutputFormat::Prg.acme_format_flag(), "cbm");
        assert_eq!(OutputFormat::Bin.acme_format_flag(), "plain");
    }

    #[test]
    fn build_args_includes_label_flag_only_when_requested() {
        let out = PathBuf::from("/tmp/x/module.bin");
        let with_labels = AssemblerDriver::build_args(&out, Some(Path::new("/tmp/x/module.labels")), OutputFormat::Prg);
        assert!(with_labels.contains(&"-l".to_string()));

        let without_labels = AssemblerDriver::build_args(&out, None, OutputFormat::Prg);
        assert!(!without_labels.contains(&"-l".to_string()));
    }
}
