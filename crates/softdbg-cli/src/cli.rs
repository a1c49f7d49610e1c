use std::path::PathBuf;

/// The softdbg debugger.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to run a scripted virtual machine under the debugger.
    Run {
        /// Session configuration (KDL format).
        ///
        /// If it ends with `.kdl`, it is treated as a path to a configuration
        /// file for the debugging session. Otherwise it is directly parsed as
        /// inline KDL-formatted configuration.
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: Option<String>,

        /// Path to the script of the virtual machine (KDL format).
        script: PathBuf,
    },

    /// Command to check a script without running it.
    Check {
        /// Path to the script of the virtual machine (KDL format).
        script: PathBuf,
    },
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
