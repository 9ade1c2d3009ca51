use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use provision_linux::TgzInstaller;
use provision_platform::{CommandRunner, Error, Installer, Platform, Result, ServiceKind};
use provision_windows::{MsiInstaller, ZipInstaller};

/// Pick the install strategy for a platform and package file. Pure selection:
/// nothing is read from disk or executed here.
///
/// - Linux: tarball strategy whatever the extension
/// - Windows + `.zip`: zip strategy
/// - Windows + anything else: msiexec strategy
pub fn create_installer(
    platform: &Platform,
    package_path: &Path,
    kind: ServiceKind,
    install_root: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn Installer>> {
    let package = Some(package_path.to_path_buf());
    let installer: Box<dyn Installer> = match platform {
        Platform::Linux => Box::new(TgzInstaller::new(kind, install_root, package, runner)),
        Platform::Windows if is_zip(package_path) => {
            Box::new(ZipInstaller::new(kind, install_root, package, runner))
        }
        Platform::Windows => Box::new(MsiInstaller::new(kind, install_root, package, runner)),
        Platform::Other(name) => {
            return Err(Error::UnsupportedPlatform {
                platform: name.clone(),
            })
        }
    };
    debug!(
        "selected installer for {} on {} (root {})",
        package_path.display(),
        platform,
        installer.install_root().display()
    );
    Ok(installer)
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}
