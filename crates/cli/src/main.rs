mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lambda_build_lib::params::PARAMS;

use crate::output::{OutputFormat, print_error};

/// lambda-build - Package Python projects into deployable layer and function artifacts
#[derive(Parser)]
#[command(name = "lambda-build")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project directory containing pyproject.toml
  #[arg(short = 'C', long, global = true, default_value = ".")]
  project_dir: PathBuf,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Only log warnings and errors
  #[arg(short, long, global = true, conflicts_with = "verbose")]
  quiet: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the configured artifacts
  #[command(after_help = parameter_help())]
  Build {
    /// Build parameters as `key=value`, `--key=value` or `--key value`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PARAM")]
    params: Vec<String>,
  },

  /// Show what would be built without running anything
  #[command(after_help = parameter_help())]
  Plan {
    /// Build parameters as `key=value`, `--key=value` or `--key value`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PARAM")]
    params: Vec<String>,
  },

  /// List every build parameter
  Params,
}

fn parameter_help() -> String {
  let width = PARAMS.iter().map(|p| p.name.len()).max().unwrap_or_default();
  let mut help = String::from("Parameters (also read from [tool.lambda-build] in pyproject.toml):\n");
  for param in PARAMS {
    help.push_str(&format!("  {:width$}  {}\n", param.name, param.help));
  }
  help
}

fn init_tracing(verbose: u8, quiet: bool) {
  let default = match (quiet, verbose) {
    (true, _) => "warn",
    (false, 0) => "lambda_build_lib=info,warn",
    (false, 1) => "info",
    (false, 2) => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose, cli.quiet);

  let result = match cli.command {
    Commands::Build { params } => cmd::cmd_build(&cli.project_dir, &params, cli.output),
    Commands::Plan { params } => cmd::cmd_plan(&cli.project_dir, &params, cli.output),
    Commands::Params => cmd::cmd_params(cli.output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}
