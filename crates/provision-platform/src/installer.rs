use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::CommandResult;
use crate::error::{Error, Result};

/// Which Splunk product a package carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    #[serde(alias = "service")]
    Splunk,
    #[serde(alias = "forwarder", alias = "service-forwarder")]
    SplunkForwarder,
}

impl ServiceKind {
    /// Name the product registers with the Windows service manager
    pub fn windows_service_name(&self) -> &'static str {
        match self {
            Self::Splunk => "Splunkd",
            Self::SplunkForwarder => "SplunkForwarder",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Splunk => f.write_str("splunk"),
            Self::SplunkForwarder => f.write_str("splunkforwarder"),
        }
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "splunk" | "service" => Ok(Self::Splunk),
            "splunkforwarder" | "forwarder" | "service-forwarder" => Ok(Self::SplunkForwarder),
            other => Err(Error::InvalidArgument(format!("unknown service kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Start the service once the files are in place
    pub start_after_install: bool,
    /// Extra installer properties, rendered as `KEY="value"` tokens
    pub extra_flags: BTreeMap<String, String>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            start_after_install: true,
            extra_flags: BTreeMap::new(),
        }
    }
}

impl InstallOptions {
    pub fn render_flags(&self) -> String {
        self.extra_flags
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One install strategy per (platform, package type).
///
/// Lifecycle: `NotInstalled -> install -> Installed -> uninstall -> NotInstalled`.
/// `uninstall` on a strategy that is not installed is a no-op.
pub trait Installer: Send + Sync {
    /// Lay the package down under `install_root` and start the service
    fn install(&mut self, package: &Path, options: &InstallOptions) -> Result<CommandResult>;

    /// Stop the service and remove the installation
    fn uninstall(&mut self) -> Result<()>;

    /// Whether the service is present at `install_root`
    fn is_installed(&self) -> Result<bool>;

    fn install_root(&self) -> &Path;

    /// Package file used by the last install, if any
    fn package_path(&self) -> Option<&Path>;

    fn kind(&self) -> ServiceKind;
}

/// Create `dir` (and parents) if it is missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| Error::filesystem(dir, e))?;
    }
    Ok(())
}

/// Delete a downloaded package file if it is still on disk.
pub fn remove_package(package: Option<&Path>) -> Result<()> {
    if let Some(path) = package {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| Error::filesystem(path, e))?;
        }
    }
    Ok(())
}

/// Recursively remove an install tree.
pub fn remove_tree(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| Error::filesystem(dir, e))?;
    }
    Ok(())
}
