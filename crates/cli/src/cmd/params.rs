use anyhow::Result;

use lambda_build_lib::params::PARAMS;

use crate::output::{OutputFormat, print_json};

/// Print every accepted build parameter.
pub fn cmd_params(format: OutputFormat) -> Result<()> {
  if format.is_json() {
    return print_json(&PARAMS);
  }
  for param in PARAMS {
    println!("{:26} {:8} {}", param.name, format!("{:?}", param.kind).to_lowercase(), param.help);
  }
  Ok(())
}
