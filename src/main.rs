use clap::Parser;
use tracing_subscriber::EnvFilter;

use idlescan::cli;
use idlescan::config;
use idlescan::errors::IdlescanError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.with_ansi(!cli.no_color).init();
    }
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        cli::Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        cli::Commands::Validate(args) => handle_validate(args).await,
        cli::Commands::Targets(args) => cli::targets::handle_targets(args).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            let exit_code = match &e {
                IdlescanError::Config(_) | IdlescanError::Yaml(_) => 2,
                IdlescanError::Auth(_) => 4,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), IdlescanError> {
    let path = std::path::PathBuf::from(&args.config);
    let config = config::parse_config(&path).await?;
    let kinds: Vec<String> = config.enabled_kinds().iter().map(|k| k.to_string()).collect();
    println!(
        "Configuration is valid: {} ({} account(s), kinds: {})",
        args.config,
        config.accounts.len(),
        kinds.join(", ")
    );
    Ok(())
}
