//! Shared contracts for installing and driving a Splunk instance: the command
//! runner seam, the installer strategy trait, platform selection and the error
//! taxonomy every other crate reports through.

pub mod command;
pub mod error;
pub mod installer;
pub mod platform;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::{CommandResult, CommandRunner};
pub use error::{Error, Result};
pub use installer::{InstallOptions, Installer, ServiceKind};
pub use platform::Platform;
