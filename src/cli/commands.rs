use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "idlescan", version, about = "Find idle cloud resources and estimate what they cost")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress display and the findings table
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one scan cycle
    Scan(ScanArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// List the scan targets a configuration expands to
    Targets(TargetsArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// YAML description of the emulated cloud to scan
    #[arg(short, long)]
    pub fixture: Option<String>,

    /// Write the scan result as JSON to this path
    #[arg(short, long)]
    pub output: Option<String>,

    /// Restrict the scan to these regions (repeatable)
    #[arg(short, long)]
    pub region: Vec<String>,

    /// Number of findings to print (0 prints all)
    #[arg(long, default_value = "20")]
    pub top: usize,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}

#[derive(Args, Clone)]
pub struct TargetsArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// Restrict to these regions (repeatable)
    #[arg(short, long)]
    pub region: Vec<String>,
}
