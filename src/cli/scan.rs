use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::commands::ScanArgs;
use crate::cli::progress::ScanProgress;
use crate::cloud::{EmulatedCloud, Fixture};
use crate::config::{self, ScanConfig};
use crate::errors::IdlescanError;
use crate::models::{CycleStatus, ScanResult};
use crate::pipeline::{ScanEvent, ScanOrchestrator};
use crate::reporting::formatter::{format_finding_line, format_scan_summary};

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), IdlescanError> {
    let mut scan_config = config::parse_config(&PathBuf::from(&args.config)).await?;
    restrict_regions(&mut scan_config, &args.region)?;

    let fixture = match &args.fixture {
        Some(path) => Fixture::load(&PathBuf::from(path)).await?,
        None => {
            warn!("No --fixture given, scanning an empty emulated cloud");
            Fixture::new()
        }
    };
    info!(config = %args.config, resources = fixture.resources.len(), "Starting scan");

    let cancel = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ScanEvent>();
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture))
        .with_cancel_token(cancel.clone())
        .with_event_channel(event_tx);

    let event_task = tokio::spawn(async move {
        let mut progress = if quiet { None } else { Some(ScanProgress::new()) };
        while let Some(event) = event_rx.recv().await {
            if let Some(ref mut prog) = progress {
                prog.handle_event(&event);
            }
        }
    });

    let result = {
        let run = orchestrator.run_cycle(&scan_config);
        tokio::pin!(run);
        loop {
            tokio::select! {
                result = &mut run => break result,
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        warn!("Interrupted, finishing with partial results");
                        cancel.cancel();
                    }
                }
            }
        }
    };
    drop(orchestrator);
    let _ = event_task.await;
    let result = result?;

    if let Some(output) = &args.output {
        write_result(&PathBuf::from(output), &result).await?;
    }
    print_result(&result, args.top, quiet);

    if result.status == CycleStatus::Failed {
        return Err(IdlescanError::Auth(format!(
            "scan cycle failed: none of {} target(s) could be processed",
            result.targets_total
        )));
    }
    Ok(())
}

/// Keep only `regions` in every account; an empty list keeps everything.
pub fn restrict_regions(config: &mut ScanConfig, regions: &[String]) -> Result<(), IdlescanError> {
    if regions.is_empty() {
        return Ok(());
    }
    for account in config.accounts.iter_mut() {
        account.regions.retain(|r| regions.contains(r));
    }
    config.accounts.retain(|a| !a.regions.is_empty());
    if config.accounts.is_empty() {
        return Err(IdlescanError::Config(format!(
            "No configured account covers region(s) {}",
            regions.join(", ")
        )));
    }
    Ok(())
}

async fn write_result(path: &Path, result: &ScanResult) -> Result<(), IdlescanError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), findings = result.findings.len(), "Wrote scan result");
    Ok(())
}

fn print_result(result: &ScanResult, top: usize, quiet: bool) {
    println!();
    print!("{}", format_scan_summary(result));
    if quiet || result.findings.is_empty() {
        return;
    }
    let shown = if top == 0 { result.findings.len() } else { top.min(result.findings.len()) };
    println!();
    for finding in result.findings.iter().take(shown) {
        println!("  {}", format_finding_line(finding));
    }
    if shown < result.findings.len() {
        println!("  ... {} more", result.findings.len() - shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;

    fn config() -> ScanConfig {
        ScanConfig {
            accounts: vec![
                AccountConfig {
                    account_id: "111111111111".into(),
                    role_name: None,
                    regions: vec!["us-east-1".into(), "eu-west-1".into()],
                },
                AccountConfig {
                    account_id: "222222222222".into(),
                    role_name: None,
                    regions: vec!["ap-south-1".into()],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_restrict_regions_drops_uncovered_accounts() {
        let mut config = config();
        restrict_regions(&mut config, &["eu-west-1".to_string()]).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].regions, vec!["eu-west-1"]);
    }

    #[test]
    fn test_restrict_to_unknown_region_is_config_error() {
        let mut config = config();
        let err = restrict_regions(&mut config, &["sa-east-1".to_string()]).unwrap_err();
        assert!(matches!(err, IdlescanError::Config(_)));
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        let mut config = config();
        restrict_regions(&mut config, &[]).unwrap();
        assert_eq!(config.accounts.len(), 2);
    }
}
