use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "restricted-access",
    version,
    about = "Restricts API actions and UI paths of a CKAN site"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    /// Path to the policy file (overrides config file setting)
    #[arg(short, long, global = true)]
    pub policy: Option<PathBuf>,

    /// Listen address (overrides config file setting)
    #[arg(long)]
    pub listen: Option<String>,

    /// Upstream CKAN base URL (overrides config file setting)
    #[arg(long)]
    pub upstream: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the gateway (default)
    Serve,
    /// Load and compile the policy, then exit
    Check,
    /// Evaluate a single request against the policy and print the outcome
    Eval(EvalArgs),
}

#[derive(Args, Debug, PartialEq)]
pub struct EvalArgs {
    /// Request path, e.g. /dataset/my-data
    #[arg(long)]
    pub path: String,

    /// Endpoint id; derived from the path when omitted
    #[arg(long)]
    pub endpoint: Option<String>,

    /// API action name; derived from the path when omitted
    #[arg(long)]
    pub action: Option<String>,

    /// Username of the caller; anonymous when omitted
    #[arg(long)]
    pub user: Option<String>,

    /// Treat the caller as a super-admin
    #[arg(long, requires = "user")]
    pub sysadmin: bool,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}
