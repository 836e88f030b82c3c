use std::ffi::OsString;

use tracing::debug;
use tracing::info;

use crate::config::LaunchConfig;
use crate::dispatch::Dispatch;
use crate::dispatch::EntryPoint;
use crate::error::Result;
use crate::identity::Confirm;
use crate::identity::GuardOutcome;
use crate::resolve::Toolchain;
use crate::resolve::resolve_interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The operator declined the identity prompt. Not an error.
    Declined,

    /// The application ran and finished with this exit code.
    Exited(i32),
}

impl LaunchOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Declined => 0,
            Self::Exited(code) => code,
        }
    }
}

/// Ties the phases together: identity guard, interpreter resolution and
/// dispatch. Configuration validation already happened when `config` was
/// built.
pub struct Launcher<'a> {
    pub config: &'a LaunchConfig,
    pub toolchain: &'a dyn Toolchain,
    pub entry_point: &'a dyn EntryPoint,
}

impl Launcher<'_> {
    /// Decides how to start the application. `None` means the operator
    /// declined to continue.
    pub fn plan(
        &self,
        args: Vec<OsString>,
        confirm: &mut dyn Confirm,
    ) -> Result<Option<Dispatch>> {
        if self.check_identity(&args, confirm)? == GuardOutcome::Declined {
            info!("launch cancelled at the identity prompt");
            return Ok(None);
        }

        let interpreter = resolve_interpreter(self.config, self.toolchain)?;
        let dispatch = Dispatch::new(interpreter, args);
        debug!(?dispatch, "dispatch decided");
        Ok(Some(dispatch))
    }

    pub async fn run(
        &self,
        args: Vec<OsString>,
        confirm: &mut dyn Confirm,
    ) -> Result<LaunchOutcome> {
        let Some(dispatch) = self.plan(args, confirm)? else {
            return Ok(LaunchOutcome::Declined);
        };
        let code = dispatch.execute(self.config, self.entry_point).await?;
        Ok(LaunchOutcome::Exited(code))
    }

    #[cfg(unix)]
    fn check_identity(
        &self,
        args: &[OsString],
        confirm: &mut dyn Confirm,
    ) -> Result<GuardOutcome> {
        let guard = crate::identity::IdentityGuard {
            marker: &self.config.user_marker,
            current_user: &self.config.user,
            data_dir: self.config.default_data_dir.as_deref(),
        };
        Ok(guard.check(args, &mut std::io::stderr(), confirm)?)
    }

    #[cfg(not(unix))]
    fn check_identity(
        &self,
        _args: &[OsString],
        _confirm: &mut dyn Confirm,
    ) -> Result<GuardOutcome> {
        Ok(GuardOutcome::Proceed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    use super::*;
    use crate::config::EnvMap;
    use crate::error::LaunchError;
    use crate::resolve::HostRuntime;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct FixedToolchain {
        executables: HashMap<OsString, PathBuf>,
        host: HostRuntime,
    }

    impl Toolchain for FixedToolchain {
        fn find(&self, name: &OsStr) -> std::result::Result<PathBuf, which::Error> {
            self.executables
                .get(name)
                .cloned()
                .ok_or(which::Error::CannotFindBinaryPath)
        }

        fn host(&self) -> Result<HostRuntime> {
            Ok(self.host.clone())
        }
    }

    #[derive(Default)]
    struct RecordingEntryPoint {
        calls: RefCell<Vec<Vec<OsString>>>,
    }

    impl EntryPoint for RecordingEntryPoint {
        fn invoke(&self, args: Vec<OsString>) -> Result<i32> {
            self.calls.borrow_mut().push(args);
            Ok(5)
        }
    }

    fn toolchain(host_major: u32, executables: &[(&str, &str)]) -> FixedToolchain {
        FixedToolchain {
            executables: executables
                .iter()
                .map(|(name, path)| (OsString::from(name), PathBuf::from(path)))
                .collect(),
            host: HostRuntime {
                executable: PathBuf::from("/usr/bin/python"),
                major_version: host_major,
            },
        }
    }

    /// Config whose marker and home live under `tmp`.
    fn config(tmp: &TempDir, vars: &[(&str, &str)]) -> LaunchConfig {
        let mut env: EnvMap = vars
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect();
        env.entry("USER".into()).or_insert_with(|| "bob".into());
        let mut config =
            LaunchConfig::from_env(env, Some(tmp.path().join("home")), tmp.path().to_path_buf())
                .unwrap();
        config.user_marker = tmp.path().join("username");
        config
    }

    fn args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[cfg(unix)]
    #[test]
    fn declined_prompt_plans_nothing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("username"), "alice\n").unwrap();
        let config = config(&tmp, &[]);
        let toolchain = toolchain(3, &[("python2", "/usr/bin/python2")]);
        let entry_point = RecordingEntryPoint::default();
        let launcher = Launcher {
            config: &config,
            toolchain: &toolchain,
            entry_point: &entry_point,
        };

        let plan = launcher
            .plan(args(&["start"]), &mut |_: &str| false)
            .unwrap();

        assert_eq!(plan, None);
    }

    #[test]
    fn missing_marker_goes_straight_to_resolution() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, &[]);
        let toolchain = toolchain(3, &[("python2", "/usr/bin/python2")]);
        let entry_point = RecordingEntryPoint::default();
        let launcher = Launcher {
            config: &config,
            toolchain: &toolchain,
            entry_point: &entry_point,
        };

        let plan = launcher
            .plan(args(&["start"]), &mut |prompt: &str| -> bool {
                panic!("unexpected prompt: {prompt}")
            })
            .unwrap();

        assert_eq!(
            plan,
            Some(Dispatch::SpawnSubprocess {
                interpreter: PathBuf::from("/usr/bin/python2"),
                args: args(&["start"]),
            })
        );
    }

    #[test]
    fn explicit_python_wins_over_old_host() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, &[("KALITE_PYTHON", "/usr/bin/python2.7")]);
        let toolchain = toolchain(2, &[("/usr/bin/python2.7", "/usr/bin/python2.7")]);
        let entry_point = RecordingEntryPoint::default();
        let launcher = Launcher {
            config: &config,
            toolchain: &toolchain,
            entry_point: &entry_point,
        };

        let plan = launcher
            .plan(args(&["manage", "shell"]), &mut |_: &str| true)
            .unwrap()
            .expect("should dispatch");

        assert_eq!(
            plan.command_line(),
            Some(args(&[
                "/usr/bin/python2.7",
                "-m",
                "kalite",
                "manage",
                "shell"
            ]))
        );
    }

    #[test]
    fn unresolvable_explicit_python_fails_before_dispatch() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, &[("KALITE_PYTHON", "/nonexistent/python")]);
        let toolchain = toolchain(3, &[]);
        let entry_point = RecordingEntryPoint::default();
        let launcher = Launcher {
            config: &config,
            toolchain: &toolchain,
            entry_point: &entry_point,
        };

        let err = launcher.plan(args(&[]), &mut |_: &str| true).unwrap_err();

        assert!(matches!(err, LaunchError::PythonNotFound { .. }));
    }

    #[tokio::test]
    async fn old_host_invokes_entry_point_in_process() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, &[]);
        let toolchain = toolchain(2, &[("python2", "/usr/bin/python2")]);
        let entry_point = RecordingEntryPoint::default();
        let launcher = Launcher {
            config: &config,
            toolchain: &toolchain,
            entry_point: &entry_point,
        };

        let outcome = launcher
            .run(args(&["start", "--foreground"]), &mut |_: &str| true)
            .await
            .unwrap();

        assert_eq!(outcome, LaunchOutcome::Exited(5));
        assert_eq!(
            entry_point.calls.into_inner(),
            vec![args(&["start", "--foreground"])]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn declined_run_exits_successfully_without_dispatch() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("username"), "alice\n").unwrap();
        let config = config(&tmp, &[]);
        let toolchain = toolchain(2, &[]);
        let entry_point = RecordingEntryPoint::default();
        let launcher = Launcher {
            config: &config,
            toolchain: &toolchain,
            entry_point: &entry_point,
        };

        let outcome = launcher
            .run(args(&["start"]), &mut |_: &str| false)
            .await
            .unwrap();

        assert_eq!(outcome, LaunchOutcome::Declined);
        assert_eq!(outcome.exit_code(), 0);
        assert!(entry_point.calls.borrow().is_empty());
    }
}
