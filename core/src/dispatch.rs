use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;

use tokio::process::Child;
use tracing::debug;

use crate::config::LaunchConfig;
use crate::error::LaunchError;
use crate::error::Result;
use crate::exit_status::exit_code;
use crate::resolve::Toolchain;
use crate::spawn::SpawnChildRequest;
use crate::spawn::spawn_child_async;

/// Module run by `python -m`.
pub const APP_MODULE: &str = "kalite";

/// How the application gets started, decided once by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Run `interpreter -m kalite args...` as a child and wait for it.
    SpawnSubprocess {
        interpreter: PathBuf,
        args: Vec<OsString>,
    },

    /// The current interpreter is acceptable; hand `args` to the
    /// [`EntryPoint`].
    InvokeInProcess { args: Vec<OsString> },
}

impl Dispatch {
    pub fn new(interpreter: Option<PathBuf>, args: Vec<OsString>) -> Self {
        match interpreter {
            Some(interpreter) => Self::SpawnSubprocess { interpreter, args },
            None => Self::InvokeInProcess { args },
        }
    }

    /// Full argv of the child, `argv[0]` included. `None` for in-process
    /// dispatch.
    pub fn command_line(&self) -> Option<Vec<OsString>> {
        match self {
            Self::SpawnSubprocess { interpreter, args } => {
                let mut argv = vec![interpreter.clone().into_os_string()];
                argv.extend(module_args(args));
                Some(argv)
            }
            Self::InvokeInProcess { .. } => None,
        }
    }

    /// Runs the application and returns the exit code to report.
    pub async fn execute(self, config: &LaunchConfig, entry_point: &dyn EntryPoint) -> Result<i32> {
        match self {
            Self::SpawnSubprocess {
                ref interpreter, ..
            } => {
                // argv[0] is the interpreter itself.
                let args = self
                    .command_line()
                    .unwrap_or_default()
                    .into_iter()
                    .skip(1)
                    .collect();
                // Listen for SIGINT before the child exists so an early Ctrl-C
                // cannot take the launcher down first.
                let mut interrupts = Interrupts::install();
                let child = spawn_child_async(SpawnChildRequest {
                    program: interpreter.clone(),
                    args,
                    cwd: config.cwd.clone(),
                    env: &config.env,
                })
                .map_err(|source| LaunchError::Spawn {
                    program: interpreter.clone(),
                    source,
                })?;
                let status = wait_for_child(child, &mut interrupts).await?;
                debug!("child exited with {status}");
                Ok(exit_code(status))
            }
            Self::InvokeInProcess { args } => entry_point.invoke(args),
        }
    }
}

/// `["-m", "kalite", args...]`
pub fn module_args(args: &[OsString]) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    argv.push(OsString::from("-m"));
    argv.push(OsString::from(APP_MODULE));
    argv.extend(args.iter().cloned());
    argv
}

/// The application's command-line entry point when no re-exec is needed.
pub trait EntryPoint {
    /// Runs the application with `args` and returns its exit code. May not
    /// return at all if it replaces the current process.
    fn invoke(&self, args: Vec<OsString>) -> Result<i32>;
}

/// Hands control to `host -m kalite args...`, where `host` is the interpreter
/// the toolchain detected. On Unix the launcher process image is replaced,
/// so no second process ever exists.
pub struct HostEntryPoint<'a> {
    config: &'a LaunchConfig,
    toolchain: &'a dyn Toolchain,
}

impl<'a> HostEntryPoint<'a> {
    pub fn new(config: &'a LaunchConfig, toolchain: &'a dyn Toolchain) -> Self {
        Self { config, toolchain }
    }
}

impl EntryPoint for HostEntryPoint<'_> {
    fn invoke(&self, args: Vec<OsString>) -> Result<i32> {
        let host = self.toolchain.host()?;
        let mut cmd = std::process::Command::new(&host.executable);
        cmd.args(module_args(&args));
        cmd.current_dir(&self.config.cwd);
        cmd.env_clear();
        cmd.envs(&self.config.env);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            debug!("exec {} -m {APP_MODULE}", host.executable.display());
            // Only returns on failure.
            let source = cmd.exec();
            Err(LaunchError::Spawn {
                program: host.executable,
                source,
            })
        }

        #[cfg(not(unix))]
        {
            let status = cmd.status().map_err(|source| LaunchError::Spawn {
                program: host.executable.clone(),
                source,
            })?;
            Ok(exit_code(status))
        }
    }
}

/// SIGINT listener used while waiting on the child. Interrupts are swallowed:
/// the child shares our terminal, receives the same signal, and its own exit
/// code is what we report.
struct Interrupts {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
    #[cfg(not(unix))]
    active: bool,
}

impl Interrupts {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        let signal = match signal(SignalKind::interrupt()) {
            Ok(signal) => Some(signal),
            Err(e) => {
                debug!("could not install SIGINT handler: {e}");
                None
            }
        };
        Self { signal }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        Self { active: true }
    }

    fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            self.active
        }
    }

    /// Waits for the next interrupt. Returns `false` once no more can arrive.
    async fn recv(&mut self) -> bool {
        #[cfg(unix)]
        {
            match self.signal.as_mut() {
                Some(signal) => signal.recv().await.is_some(),
                None => false,
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.is_ok()
        }
    }

    fn disable(&mut self) {
        #[cfg(unix)]
        {
            self.signal = None;
        }
        #[cfg(not(unix))]
        {
            self.active = false;
        }
    }
}

async fn wait_for_child(mut child: Child, interrupts: &mut Interrupts) -> Result<ExitStatus> {
    loop {
        let active = interrupts.is_active();
        let received = tokio::select! {
            status = child.wait() => return Ok(status?),
            received = interrupts.recv(), if active => received,
        };
        if received {
            debug!("interrupt received; waiting for child to exit");
        } else {
            interrupts.disable();
        }
    }
}
