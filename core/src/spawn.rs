use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Child;
use tokio::process::Command;
use tracing::trace;

use crate::config::EnvMap;

/// Everything needed to start the application under another interpreter.
/// The child's `argv[0]` is `program` as given.
pub(crate) struct SpawnChildRequest<'a> {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub env: &'a EnvMap,
}

/// Spawns the child with stdin, stdout and stderr inherited from the
/// launcher, so output reaches the terminal untouched.
pub(crate) fn spawn_child_async(request: SpawnChildRequest<'_>) -> std::io::Result<Child> {
    let SpawnChildRequest {
        program,
        args,
        cwd,
        env,
    } = request;

    trace!("spawn_child_async: {program:?} {args:?} {cwd:?}");

    let mut cmd = Command::new(&program);
    cmd.args(args);
    cmd.current_dir(cwd);
    cmd.env_clear();
    cmd.envs(env);

    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    // If the launcher bails out while still holding the handle, take the
    // child down with it.
    cmd.kill_on_drop(true).spawn()
}
