//! lambda-build-lib: packaging Python projects into deployable artifacts.
//!
//! A build resolves a [`params::ParameterSet`] from project configuration and
//! command-line tokens, classifies it into a [`build::BuildVariant`] and
//! produces one or two artifacts (zip archives or directories):
//! - a layer holding the locked third-party dependencies
//! - a function holding the project's own package
//! - or a single package holding both
//!
//! Install commands run on the host or inside a container through an
//! [`backend::ExecutionBackend`]. Each artifact embeds a [`checksum::Checksum`]
//! of its inputs so unchanged targets are skipped on the next run.

pub mod artifact;
pub mod backend;
pub mod build;
pub mod checksum;
pub mod command;
pub mod consts;
pub mod params;
pub mod project;
pub mod requirements;
pub mod util;

pub use build::{BuildError, Builder};
pub use params::ParameterSet;
pub use project::Project;
