use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LaunchError>;

#[derive(Error, Debug)]
pub enum LaunchError {
    /// `KALITE_DIR` was set but points at nothing.
    #[error("KALITE_DIR is set to {}, which does not exist", .0.display())]
    MissingKaliteDir(PathBuf),

    /// `KALITE_PYTHON` was set but does not name an executable we can find.
    #[error("KALITE_PYTHON is set to {value:?}, which is not an executable: {source}")]
    PythonNotFound {
        value: OsString,
        #[source]
        source: which::Error,
    },

    /// Auto-detection needs a host interpreter to compare against.
    #[error("could not find `python` or `python3` on PATH; set KALITE_PYTHON")]
    NoHostInterpreter,

    #[error("could not determine the version of {}: {reason}", .interpreter.display())]
    HostVersion { interpreter: PathBuf, reason: String },

    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
