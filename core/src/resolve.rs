use std::cell::OnceCell;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;

use tracing::debug;
use tracing::warn;

use crate::config::LaunchConfig;
use crate::error::LaunchError;
use crate::error::Result;

/// Preferred interpreter when the host is Python 3 or newer.
pub const LEGACY_PYTHON_ALIAS: &str = "python2";

/// Tried after [`LEGACY_PYTHON_ALIAS`].
pub const GENERIC_PYTHON_ALIAS: &str = "python";

/// Names tried, in order, to find the host interpreter.
pub const HOST_PYTHON_CANDIDATES: [&str; 2] = ["python", "python3"];

const VERSION_SCRIPT: &str = "import sys; sys.stdout.write(str(sys.version_info[0]))";

/// The interpreter a plain `kalite` invocation would run under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRuntime {
    pub executable: PathBuf,
    pub major_version: u32,
}

/// Executable lookup and host detection, kept behind a trait so resolution
/// can be exercised without real interpreters.
pub trait Toolchain {
    /// Resolves `name` to a full path, searching `PATH` for bare names.
    fn find(&self, name: &OsStr) -> std::result::Result<PathBuf, which::Error>;

    fn host(&self) -> Result<HostRuntime>;
}

/// [`Toolchain`] backed by the real filesystem and the configured `PATH`.
/// The host interpreter is located and queried at most once.
#[derive(Debug)]
pub struct SystemToolchain {
    search_path: OsString,
    cwd: PathBuf,
    host: OnceCell<HostRuntime>,
}

impl SystemToolchain {
    pub fn new(config: &LaunchConfig) -> Self {
        Self {
            search_path: config.search_path.clone(),
            cwd: config.cwd.clone(),
            host: OnceCell::new(),
        }
    }

    fn detect_host(&self) -> Result<HostRuntime> {
        let executable = HOST_PYTHON_CANDIDATES
            .iter()
            .find_map(|name| self.find(OsStr::new(name)).ok())
            .ok_or(LaunchError::NoHostInterpreter)?;
        let major_version = query_major_version(&executable)?;
        debug!(
            "host interpreter {} reports major version {major_version}",
            executable.display()
        );
        Ok(HostRuntime {
            executable,
            major_version,
        })
    }
}

impl Toolchain for SystemToolchain {
    fn find(&self, name: &OsStr) -> std::result::Result<PathBuf, which::Error> {
        which::which_in(name, Some(&self.search_path), &self.cwd)
    }

    fn host(&self) -> Result<HostRuntime> {
        if let Some(host) = self.host.get() {
            return Ok(host.clone());
        }
        let host = self.detect_host()?;
        Ok(self.host.get_or_init(|| host).clone())
    }
}

/// Blocks on the child. This runs at most once per launch, during
/// resolution, before the wait loop has anything to await.
fn query_major_version(interpreter: &Path) -> Result<u32> {
    let output = Command::new(interpreter)
        .args(["-c", VERSION_SCRIPT])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|source| LaunchError::Spawn {
            program: interpreter.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(LaunchError::HostVersion {
            interpreter: interpreter.to_path_buf(),
            reason: format!("version query exited with {}", output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_major_version(&stdout).ok_or_else(|| LaunchError::HostVersion {
        interpreter: interpreter.to_path_buf(),
        reason: format!("unexpected version output {stdout:?}"),
    })
}

fn parse_major_version(output: &str) -> Option<u32> {
    output.trim().parse().ok()
}

/// Picks the interpreter to re-exec into, or `None` to stay in-process.
pub fn resolve_interpreter(
    config: &LaunchConfig,
    toolchain: &dyn Toolchain,
) -> Result<Option<PathBuf>> {
    if let Some(python) = &config.kalite_python {
        return match toolchain.find(python) {
            Ok(found) => {
                debug!("KALITE_PYTHON resolves to {}", found.display());
                Ok(Some(PathBuf::from(python)))
            }
            Err(source) => Err(LaunchError::PythonNotFound {
                value: python.clone(),
                source,
            }),
        };
    }

    let host = toolchain.host()?;
    if host.major_version < 3 {
        debug!(
            "host interpreter {} is Python {}; staying in-process",
            host.executable.display(),
            host.major_version
        );
        return Ok(None);
    }

    let found = [LEGACY_PYTHON_ALIAS, GENERIC_PYTHON_ALIAS]
        .iter()
        .find_map(|alias| toolchain.find(OsStr::new(alias)).ok());
    match found {
        Some(path) => Ok(Some(path)),
        None => {
            warn!(
                "could not find `{LEGACY_PYTHON_ALIAS}` or `{GENERIC_PYTHON_ALIAS}` on PATH; \
                 falling back to {}",
                host.executable.display()
            );
            Ok(Some(host.executable))
        }
    }
}
