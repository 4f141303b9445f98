//! Implementation of the `lambda-build build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use lambda_build_lib::build::BuildReport;

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

/// Build every configured artifact, skipping those whose inputs are unchanged.
pub fn cmd_build(project_dir: &Path, tokens: &[String], format: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let builder = super::load_builder(project_dir, tokens)?;
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

  let report = rt.block_on(builder.build()).context("Build failed")?;

  if format.is_json() {
    return print_json(&report);
  }
  print_report(&report);
  print_stat("Elapsed", &format_duration(start.elapsed()));
  Ok(())
}

fn print_report(report: &BuildReport) {
  print_info(&format!("Build: {} via {}", report.variant, report.backend));
  for target in &report.targets {
    match target.files {
      Some(files) => print_success(&format!("{} {} ({} files)", target.kind, target.path, files)),
      None => print_info(&format!("{} {} is up to date", target.kind, target.path)),
    }
  }
  print_stat("Built", &report.built().to_string());
  print_stat("Skipped", &report.skipped().to_string());
}
