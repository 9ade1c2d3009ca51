//! Tarball install: extract into the install root and drive the bundled CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use provision_platform::installer::{ensure_dir, remove_package, remove_tree};
use provision_platform::{CommandResult, CommandRunner, InstallOptions, Installer, Result, ServiceKind};

pub const DEFAULT_SPLUNK_HOME: &str = "/opt/splunk";
pub const DEFAULT_FORWARDER_HOME: &str = "/opt/splunkforwarder";

pub struct TgzInstaller {
    kind: ServiceKind,
    install_root: PathBuf,
    package_path: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl TgzInstaller {
    pub fn new(
        kind: ServiceKind,
        install_root: Option<PathBuf>,
        package_path: Option<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let install_root = install_root.unwrap_or_else(|| {
            PathBuf::from(match kind {
                ServiceKind::Splunk => DEFAULT_SPLUNK_HOME,
                ServiceKind::SplunkForwarder => DEFAULT_FORWARDER_HOME,
            })
        });
        Self {
            kind,
            install_root,
            package_path,
            runner,
        }
    }

    fn cli(&self) -> PathBuf {
        self.install_root.join("bin").join("splunk")
    }
}

impl Installer for TgzInstaller {
    fn install(&mut self, package: &Path, options: &InstallOptions) -> Result<CommandResult> {
        info!(
            "installing {} from {} into {}",
            self.kind,
            package.display(),
            self.install_root.display()
        );

        if self.is_installed()? {
            let stop = format!("\"{}\" stop", self.cli().display());
            let result = self.runner.run(&stop)?;
            if !result.success() {
                warn!("stop before reinstall failed: {}", result.combined_output().trim());
            }
        }

        ensure_dir(&self.install_root)?;
        self.package_path = Some(package.to_path_buf());

        let extract = format!(
            "tar --strip-components=1 -xf \"{}\" -C \"{}\"",
            package.display(),
            self.install_root.display()
        );
        debug!("extracting: {}", extract);
        let result = self.runner.run(&extract)?;
        if !result.success() {
            warn!("extract failed with exit code {}", result.exit_code);
            return Ok(result);
        }
        if !options.start_after_install {
            return Ok(result);
        }

        let start = format!(
            "\"{}\" start --accept-license --answer-yes --no-prompt",
            self.cli().display()
        );
        self.runner.run(&start)
    }

    fn uninstall(&mut self) -> Result<()> {
        if !self.is_installed()? {
            debug!("{} not installed at {}, nothing to do", self.kind, self.install_root.display());
            return Ok(());
        }

        info!("uninstalling {} from {}", self.kind, self.install_root.display());

        let stop = format!("\"{}\" stop -f", self.cli().display());
        self.runner.run(&stop)?.into_checked(&stop)?;

        remove_tree(&self.install_root)?;
        remove_package(self.package_path.as_deref())?;
        self.package_path = None;

        info!("uninstalled {}", self.kind);
        Ok(())
    }

    fn is_installed(&self) -> Result<bool> {
        Ok(self.cli().exists())
    }

    fn install_root(&self) -> &Path {
        &self.install_root
    }

    fn package_path(&self) -> Option<&Path> {
        self.package_path.as_deref()
    }

    fn kind(&self) -> ServiceKind {
        self.kind
    }
}
