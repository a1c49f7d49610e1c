#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use softdbg_cli::{CliAction, CliOpts};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("SOFTDBG_LOG")
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let res = match cli.action {
        CliAction::Run { config, script } => softdbg_cli::evaluate_run(config, script).map(Some),
        CliAction::Check { script } => {
            softdbg_cli::evaluate_check(script, std::io::stdout()).map(|_| None)
        }
    };

    match res {
        Ok(Some(exit_code)) => std::process::exit(exit_code),
        Ok(None) => (),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}
