//! Windows zip install: unpack next to the install root, register boot-start
//! and run the bundled CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use provision_platform::installer::{ensure_dir, remove_package, remove_tree};
use provision_platform::{
    CommandResult, CommandRunner, Error, InstallOptions, Installer, Result, ServiceKind,
};

pub const DEFAULT_HOME: &str = r"C:\splunk";

/// Web service registered alongside splunkd by zip installs
const WEB_SERVICE_NAME: &str = "Splunkweb";

pub struct ZipInstaller {
    kind: ServiceKind,
    install_root: PathBuf,
    package_path: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl ZipInstaller {
    pub fn new(
        kind: ServiceKind,
        install_root: Option<PathBuf>,
        package_path: Option<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            kind,
            install_root: install_root.unwrap_or_else(|| PathBuf::from(DEFAULT_HOME)),
            package_path,
            runner,
        }
    }

    fn cli(&self) -> PathBuf {
        self.install_root.join("bin").join("splunk.exe")
    }

    /// The archive carries its own top-level directory, so it unpacks into
    /// the parent of the install root.
    fn extract_dir(&self) -> &Path {
        self.install_root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(&self.install_root)
    }
}

impl Installer for ZipInstaller {
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

        let cli = self.cli();
        let mut steps = vec![
            format!(
                "unzip -o \"{}\" -d \"{}\"",
                package.display(),
                self.extract_dir().display()
            ),
            format!("\"{}\" enable boot-start", cli.display()),
        ];
        if options.start_after_install {
            steps.push(format!(
                "\"{}\" start --accept-license --answer-yes --no-prompt",
                cli.display()
            ));
        }

        let mut last = CommandResult::new(0, "", "");
        for step in &steps {
            debug!("running: {}", step);
            last = self.runner.run(step)?;
            if !last.success() {
                warn!("install step failed with exit code {}: {}", last.exit_code, step);
                break;
            }
        }
        Ok(last)
    }

    fn uninstall(&mut self) -> Result<()> {
        if !self.is_installed()? {
            debug!("{} not installed at {}, nothing to do", self.kind, self.install_root.display());
            return Ok(());
        }

        info!("uninstalling {} from {}", self.kind, self.install_root.display());

        let stop_cmd = format!("\"{}\" stop -f", self.cli().display());
        let stop = self.runner.run(&stop_cmd)?;

        remove_tree(&self.install_root)?;

        for service in [self.kind.windows_service_name(), WEB_SERVICE_NAME] {
            let result = self.runner.run(&format!("sc delete {}", service))?;
            if !result.success() {
                debug!("sc delete {} exited {}", service, result.exit_code);
            }
        }

        if !stop.success() {
            return Err(Error::command_execution(stop_cmd, stop.combined_output()));
        }

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
