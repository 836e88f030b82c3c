use std::ffi::OsString;
use std::future::Future;

use kalite_core::HostEntryPoint;
use kalite_core::LaunchConfig;
use kalite_core::Launcher;
use kalite_core::StdinConfirm;
use kalite_core::SystemToolchain;
use kalite_core::config::find_kalite_home;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Prepares the process and drives `main_fn` to completion, returning the
/// exit code it produced.
///
/// 1.  Use [`dotenvy::from_path`] to pick up `$KALITE_HOME/.env` before any
///     threads exist, since it modifies the environment.
/// 2.  Construct a single-threaded Tokio runtime; the launcher only ever
///     waits on one child and one signal.
/// 3.  Execute the provided async `main_fn` inside that runtime, forwarding
///     any error.
pub fn run_with_runtime<F, Fut>(main_fn: F) -> anyhow::Result<i32>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<i32>>,
{
    load_dotenv();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(main_fn())
}

/// Load env vars from `$KALITE_HOME/.env` (default `~/.kalite/.env`).
/// Variables already set in the environment win.
fn load_dotenv() {
    if let Some(kalite_home) = find_kalite_home() {
        dotenvy::from_path(kalite_home.join(".env")).ok();
    }
}

/// Launches KA Lite with this process's arguments and returns the exit code
/// to report.
pub async fn run_main() -> anyhow::Result<i32> {
    init_logging();

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    debug!("proxying {} argument(s)", args.len());

    let config = LaunchConfig::load()?;
    let toolchain = SystemToolchain::new(&config);
    let entry_point = HostEntryPoint::new(&config, &toolchain);
    let launcher = Launcher {
        config: &config,
        toolchain: &toolchain,
        entry_point: &entry_point,
    };

    let outcome = launcher.run(args, &mut StdinConfirm).await?;
    Ok(outcome.exit_code())
}

fn init_logging() {
    let default_level = "warn";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .try_init();
}
