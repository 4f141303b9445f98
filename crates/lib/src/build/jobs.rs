//! Install job templates.

use super::TargetKind;
use crate::command::CommandTemplate;

pub const MKDIR: &str = "mkdir -p {output_dir}";
pub const INSTALL_DEPS: &str = "pip install -q -t {output_dir} --no-cache-dir {indexes} -r {requirements}";
pub const INSTALL_POETRY: &str = "pip install poetry --quiet --upgrade pip";
pub const BUILD_PACKAGE: &str = "poetry build -q";
pub const INSTALL_WHEEL_NO_DEPS: &str =
  "poetry run pip install -q -t {output_dir} --find-links=dist {package_name} --no-cache-dir --no-deps --upgrade";

fn layer() -> CommandTemplate {
  CommandTemplate::join([CommandTemplate::parse(MKDIR), CommandTemplate::parse(INSTALL_DEPS)])
}

fn function() -> CommandTemplate {
  CommandTemplate::join([
    CommandTemplate::parse(BUILD_PACKAGE),
    CommandTemplate::parse(MKDIR),
    CommandTemplate::parse(INSTALL_WHEEL_NO_DEPS),
  ])
}

/// The full install job for a target.
///
/// `pre_install` runs first. Container images may lack poetry, so container
/// jobs that run it install it before anything else.
pub fn install_job(kind: TargetKind, in_container: bool, pre_install: &[String]) -> CommandTemplate {
  let body = match kind {
    TargetKind::Layer => layer(),
    TargetKind::Function => function(),
    TargetKind::Package => layer().and_then(function()),
  };
  let install_poetry = if in_container && kind != TargetKind::Layer {
    CommandTemplate::parse(INSTALL_POETRY)
  } else {
    CommandTemplate::default()
  };

  CommandTemplate::join([CommandTemplate::new(pre_install.iter().cloned()), install_poetry, body])
}
