//! Implementation of the `lambda-build plan` command.
//!
//! Resolves parameters and targets exactly as `build` would and prints them
//! together with the install job of each target. Nothing is executed.

use std::path::Path;

use anyhow::Result;

use lambda_build_lib::build::BuildPlan;

use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};

pub fn cmd_plan(project_dir: &Path, tokens: &[String], format: OutputFormat) -> Result<()> {
  let builder = super::load_builder(project_dir, tokens)?;
  let plan = builder.plan()?;

  if format.is_json() {
    return print_json(&plan);
  }
  print_plan(&plan);
  Ok(())
}

fn print_plan(plan: &BuildPlan) {
  print_info(&format!("Build: {} via {}", plan.variant, plan.backend));
  for target in &plan.targets {
    let symbol = match target.up_to_date {
      Some(true) => symbols::UNCHANGED,
      _ => symbols::ADD,
    };
    println!("  {} {} {} {}", symbol, target.kind, symbols::ARROW, target.path);
    if !target.install_prefix.is_empty() {
      print_stat("    Install dir", &target.install_prefix);
    }
    print_stat("    Format", if target.archive { "zip" } else { "directory" });
    print_stat("    Job", &target.job);
    let status = match target.up_to_date {
      Some(true) => "up to date",
      Some(false) => "changed",
      None => "checksum disabled",
    };
    print_stat("    Status", status);
  }
}
