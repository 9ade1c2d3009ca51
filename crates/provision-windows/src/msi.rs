//! Windows Installer (msiexec) strategy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use provision_platform::installer::remove_package;
use provision_platform::{
    CommandResult, CommandRunner, Error, InstallOptions, Installer, Result, ServiceKind,
};

pub const DEFAULT_SPLUNK_HOME: &str = r"C:\Program Files\Splunk";
pub const DEFAULT_FORWARDER_HOME: &str = r"C:\Program Files\SplunkUniversalForwarder";
pub const MSI_LOG_PATH: &str = r"C:\msi_install.log";

pub struct MsiInstaller {
    kind: ServiceKind,
    install_root: PathBuf,
    package_path: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl MsiInstaller {
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

    fn install_command(&self, package: &Path, options: &InstallOptions) -> String {
        let mut options = options.clone();
        if !options.start_after_install {
            options
                .extra_flags
                .entry("LAUNCHSPLUNK".to_string())
                .or_insert_with(|| "0".to_string());
        }

        let mut parts = vec![
            format!("msiexec /i \"{}\"", package.display()),
            format!("INSTALLDIR=\"{}\"", self.install_root.display()),
            "AGREETOLICENSE=Yes".to_string(),
        ];
        let flags = options.render_flags();
        if !flags.is_empty() {
            parts.push(flags);
        }
        parts.push("/quiet".to_string());
        parts.push(format!("/L*V \"{}\"", MSI_LOG_PATH));
        parts.join(" ")
    }
}

impl Installer for MsiInstaller {
    fn install(&mut self, package: &Path, options: &InstallOptions) -> Result<CommandResult> {
        info!(
            "installing {} from {} into {}",
            self.kind,
            package.display(),
            self.install_root.display()
        );
        let cmd = self.install_command(package, options);
        debug!("msiexec: {}", cmd);

        self.package_path = Some(package.to_path_buf());
        self.runner.run(&cmd)
    }

    fn uninstall(&mut self) -> Result<()> {
        if !self.is_installed()? {
            debug!("{} service not registered, nothing to do", self.kind);
            return Ok(());
        }

        let package = self.package_path.clone().ok_or(Error::MissingPackage)?;
        info!("uninstalling {} using {}", self.kind, package.display());

        let cmd = format!("msiexec /x \"{}\" /quiet SUPPRESS_SURVEY=1", package.display());
        self.runner.run(&cmd)?.into_checked(&cmd)?;

        remove_package(Some(&package))?;
        self.package_path = None;
        info!("uninstalled {}", self.kind);
        Ok(())
    }

    fn is_installed(&self) -> Result<bool> {
        let cmd = format!("sc query {}", self.kind.windows_service_name());
        let result = self.runner.run(&cmd)?;
        debug!("{} exited {}", cmd, result.exit_code);
        Ok(result.success())
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
