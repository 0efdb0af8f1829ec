use std::path::PathBuf;

use crate::cli::commands::TargetsArgs;
use crate::cli::scan::restrict_regions;
use crate::config;
use crate::errors::IdlescanError;
use crate::pipeline::build_targets;
use crate::scanners::ScannerRegistry;

pub async fn handle_targets(args: TargetsArgs) -> Result<(), IdlescanError> {
    let mut scan_config = config::parse_config(&PathBuf::from(&args.config)).await?;
    restrict_regions(&mut scan_config, &args.region)?;

    let targets = build_targets(&scan_config, &ScannerRegistry::builtin())?;
    for target in &targets {
        println!(
            "{:<14} {:<16} {}",
            target.account_id, target.region, target.resource_kind
        );
    }
    println!("{} target(s)", targets.len());
    Ok(())
}
