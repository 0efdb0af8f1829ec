use std::collections::HashMap;
use std::time::Instant;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::models::{CycleStatus, ScanTarget};
use crate::pipeline::ScanEvent;
use crate::utils::formatting::{format_duration, format_monthly};

/// Multi-bar display of a running scan cycle, driven by [`ScanEvent`]s.
pub struct ScanProgress {
    multi: MultiProgress,
    targets_bar: Option<ProgressBar>,
    target_spinners: HashMap<ScanTarget, ProgressBar>,
    status_bar: ProgressBar,
    findings_count: usize,
    failed_count: usize,
    start_time: Instant,
}

impl ScanProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        // Status line at the bottom: elapsed / findings / failures
        let status_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(spinner) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            status_bar.set_style(spinner);
        }
        status_bar.set_message("Resolving credentials...");
        status_bar.enable_steady_tick(std::time::Duration::from_millis(120));

        Self {
            multi,
            targets_bar: None,
            target_spinners: HashMap::new(),
            status_bar,
            findings_count: 0,
            failed_count: 0,
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::CycleStarted { targets_total, .. } => {
                let bar = self
                    .multi
                    .insert_before(&self.status_bar, ProgressBar::new(*targets_total as u64));
                if let Ok(bar_style) =
                    ProgressStyle::default_bar().template("  {bar:30.cyan/dark_gray} {pos}/{len} targets | {msg}")
                {
                    bar.set_style(bar_style.progress_chars("█▓░"));
                }
                bar.set_message("scanning");
                self.targets_bar = Some(bar);
                self.update_status();
            }
            ScanEvent::TargetStarted { target } => {
                let spinner = self
                    .multi
                    .insert_before(&self.status_bar, ProgressBar::new_spinner());
                if let Ok(spinner_style) = ProgressStyle::default_spinner().template("    {spinner:.yellow} {msg}") {
                    spinner.set_style(spinner_style);
                }
                spinner.set_message(target.to_string());
                spinner.enable_steady_tick(std::time::Duration::from_millis(100));
                self.target_spinners.insert(target.clone(), spinner);
            }
            ScanEvent::TargetCompleted { target, findings, .. } => {
                self.finish_target(target);
                self.findings_count += findings;
                self.update_status();
            }
            ScanEvent::TargetFailed { target, kind, error } => {
                self.finish_target(target);
                self.failed_count += 1;
                self.println(&format!(
                    "  {} {} [{}] {}",
                    style("!").red(),
                    target,
                    kind.as_str(),
                    error
                ));
                self.update_status();
            }
            ScanEvent::CycleCompleted {
                status,
                total_findings,
                total_monthly_savings,
                duration_ms,
            } => {
                for (_, spinner) in self.target_spinners.drain() {
                    spinner.finish_and_clear();
                }
                if let Some(bar) = self.targets_bar.take() {
                    match status {
                        CycleStatus::Failed => bar.abandon_with_message("failed"),
                        _ => bar.finish_with_message("done"),
                    }
                }
                self.status_bar.finish_with_message(format!(
                    "Scan {}: {} findings | {} | {}",
                    status,
                    total_findings,
                    format_monthly(*total_monthly_savings),
                    format_duration(*duration_ms),
                ));
            }
        }
    }

    fn finish_target(&mut self, target: &ScanTarget) {
        if let Some(spinner) = self.target_spinners.remove(target) {
            spinner.finish_and_clear();
        }
        if let Some(bar) = &self.targets_bar {
            bar.inc(1);
        }
    }

    fn update_status(&self) {
        let elapsed = format_duration(self.start_time.elapsed().as_millis() as u64);
        self.status_bar.set_message(format!(
            "{} | {} findings | {} failed",
            elapsed, self.findings_count, self.failed_count,
        ));
    }

    /// Print a line through the multi-progress (won't interfere with bars).
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}
