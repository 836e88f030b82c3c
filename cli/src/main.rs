use kalite_cli::run_main;
use kalite_cli::run_with_runtime;

fn main() -> anyhow::Result<()> {
    let code = run_with_runtime(run_main)?;
    std::process::exit(code);
}
