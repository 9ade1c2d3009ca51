//! End-to-end install: fetch the package, pick a strategy, run it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use provision_platform::{
    CommandResult, CommandRunner, InstallOptions, Installer, Platform, Result, ServiceKind,
};

use crate::factory::create_installer;
use crate::fetch::{package_file_name, PackageFetcher};

/// Exit code reported when the target is already installed and no upgrade was asked for
pub const ALREADY_INSTALLED_EXIT_CODE: i32 = 9;

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub pkg_url: String,
    pub kind: ServiceKind,
    /// Platform default when unset
    pub install_root: Option<PathBuf>,
    /// Reinstall over an existing installation
    pub upgrade: bool,
    pub options: InstallOptions,
    /// Expected SHA-256 of the package, hex encoded
    pub sha256: Option<String>,
    /// Where the package is downloaded; the system temp dir when unset
    pub download_dir: Option<PathBuf>,
}

impl InstallRequest {
    pub fn new(pkg_url: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            pkg_url: pkg_url.into(),
            kind,
            install_root: None,
            upgrade: false,
            options: InstallOptions::default(),
            sha256: None,
            download_dir: None,
        }
    }

    fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("splunk-provision"))
    }
}

/// The strategy that ran, kept so the caller can query or uninstall later.
pub struct InstallOutcome {
    pub installer: Box<dyn Installer>,
    pub result: CommandResult,
}

pub async fn install(
    request: &InstallRequest,
    platform: &Platform,
    runner: Arc<dyn CommandRunner>,
    fetcher: &PackageFetcher,
) -> Result<InstallOutcome> {
    let package = request
        .download_dir()
        .join(package_file_name(&request.pkg_url)?);

    let mut installer = create_installer(
        platform,
        &package,
        request.kind,
        request.install_root.clone(),
        runner,
    )?;

    if installer.is_installed()? && !request.upgrade {
        warn!(
            "{} already installed at {}, skipping",
            request.kind,
            installer.install_root().display()
        );
        let msg = "splunk is installed";
        return Ok(InstallOutcome {
            installer,
            result: CommandResult::new(ALREADY_INSTALLED_EXIT_CODE, msg, msg),
        });
    }

    match &request.sha256 {
        Some(digest) => fetcher.fetch_verified(&request.pkg_url, &package, digest).await?,
        None => fetcher.fetch(&request.pkg_url, &package).await?,
    };

    let result = installer.install(&package, &request.options)?;
    if result.success() {
        info!(
            "installed {} at {}",
            request.kind,
            installer.install_root().display()
        );
    } else {
        warn!("install exited with {}", result.exit_code);
    }
    Ok(InstallOutcome { installer, result })
}
