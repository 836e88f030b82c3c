use std::collections::HashMap;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::PathBuf;

use dirs::home_dir;
use tracing::debug;

use crate::error::LaunchError;
use crate::error::Result;

pub const KALITE_DIR_ENV_VAR: &str = "KALITE_DIR";
pub const KALITE_PYTHON_ENV_VAR: &str = "KALITE_PYTHON";
pub const KALITE_HOME_ENV_VAR: &str = "KALITE_HOME";
pub const USER_ENV_VAR: &str = "USER";
pub const PATH_ENV_VAR: &str = "PATH";

/// Written by the system packages; its first line names the account KA Lite
/// was installed for.
pub const USER_MARKER_PATH: &str = "/etc/ka-lite/username";

/// Name of the per-user data directory under `$HOME`.
pub const DATA_DIR_NAME: &str = ".kalite";

/// Snapshot of the process environment. Values are kept as `OsString` so the
/// child sees exactly what we saw.
pub type EnvMap = HashMap<OsString, OsString>;

/// Everything the launcher reads from its surroundings, captured once at
/// startup.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Installation root (`KALITE_DIR`). Validated to exist.
    pub kalite_dir: Option<PathBuf>,

    /// Explicit interpreter (`KALITE_PYTHON`), verbatim.
    pub kalite_python: Option<OsString>,

    /// User data directory (`KALITE_HOME`, else `~/.kalite`).
    pub kalite_home: Option<PathBuf>,

    /// `~/.kalite`, regardless of `KALITE_HOME`. The identity guard looks
    /// here.
    pub default_data_dir: Option<PathBuf>,

    pub user: String,

    /// `PATH`, or the empty string when unset.
    pub search_path: OsString,

    pub cwd: PathBuf,

    /// Environment handed to the child: the full snapshot with `PATH`
    /// normalized.
    pub env: EnvMap,

    pub user_marker: PathBuf,
}

impl LaunchConfig {
    /// Reads the live process environment.
    pub fn load() -> Result<Self> {
        let env: EnvMap = std::env::vars_os().collect();
        let cwd = std::env::current_dir()?;
        Self::from_env(env, home_dir(), cwd)
    }

    /// Builds and validates a config from an explicit environment snapshot.
    pub fn from_env(mut env: EnvMap, home: Option<PathBuf>, cwd: PathBuf) -> Result<Self> {
        let search_path = env
            .entry(OsString::from(PATH_ENV_VAR))
            .or_default()
            .clone();

        let kalite_dir = non_empty(&env, KALITE_DIR_ENV_VAR).map(PathBuf::from);
        if let Some(dir) = &kalite_dir {
            if !cwd.join(dir).exists() {
                return Err(LaunchError::MissingKaliteDir(dir.clone()));
            }
        }

        let kalite_python = non_empty(&env, KALITE_PYTHON_ENV_VAR).map(OsStr::to_os_string);

        let default_data_dir = home.map(|home| home.join(DATA_DIR_NAME));
        let kalite_home = non_empty(&env, KALITE_HOME_ENV_VAR)
            .map(PathBuf::from)
            .or_else(|| default_data_dir.clone());

        let user = non_empty(&env, USER_ENV_VAR)
            .map(|user| user.to_string_lossy().into_owned())
            .unwrap_or_else(whoami::username);

        debug!(
            ?kalite_dir,
            ?kalite_python,
            ?kalite_home,
            user = %user,
            "loaded launch configuration"
        );

        Ok(Self {
            kalite_dir,
            kalite_python,
            kalite_home,
            default_data_dir,
            user,
            search_path,
            cwd,
            env,
            user_marker: PathBuf::from(USER_MARKER_PATH),
        })
    }
}

/// Returns the KA Lite data directory from `KALITE_HOME`, or `~/.kalite`.
/// Does not verify that the directory exists.
pub fn find_kalite_home() -> Option<PathBuf> {
    match std::env::var_os(KALITE_HOME_ENV_VAR) {
        Some(val) if !val.is_empty() => Some(PathBuf::from(val)),
        _ => home_dir().map(|home| home.join(DATA_DIR_NAME)),
    }
}

fn non_empty<'a>(env: &'a EnvMap, key: &str) -> Option<&'a OsStr> {
    env.get(OsStr::new(key))
        .map(OsString::as_os_str)
        .filter(|val| !val.is_empty())
}
