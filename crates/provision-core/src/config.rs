use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use provision_platform::{Platform, ServiceKind};

use crate::management::Credentials;
use crate::namespace::{Namespace, Sharing};
use crate::service::RestartPolicy;

/// Settings for one provisioning run: where the package comes from, where it
/// goes, and how to reach the running instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// URL of the package to install
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkg_url: Option<String>,

    /// Install root; platform default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splunk_home: Option<PathBuf>,

    #[serde(default)]
    pub service_kind: ServiceKind,

    /// Instance is already installed and running
    #[serde(default)]
    pub skip_install: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_path: Option<PathBuf>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_mgmt_port")]
    pub mgmt_port: u16,

    /// Verify the management API certificate (off for self-signed installs)
    #[serde(default)]
    pub verify_tls: bool,

    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_app")]
    pub app: String,

    #[serde(default)]
    pub sharing: Sharing,

    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: u64,

    #[serde(default = "default_restart_poll")]
    pub restart_poll_secs: u64,
}

fn default_username() -> String {
    "admin".to_string()
}
fn default_password() -> String {
    "changeme".to_string()
}
fn default_scheme() -> String {
    "https".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_mgmt_port() -> u16 {
    8089
}
fn default_owner() -> String {
    "admin".to_string()
}
fn default_app() -> String {
    "search".to_string()
}
fn default_restart_timeout() -> u64 {
    300
}
fn default_restart_poll() -> u64 {
    2
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            pkg_url: None,
            splunk_home: None,
            service_kind: ServiceKind::default(),
            skip_install: false,
            license_path: None,
            username: default_username(),
            password: default_password(),
            scheme: default_scheme(),
            host: default_host(),
            mgmt_port: default_mgmt_port(),
            verify_tls: false,
            owner: default_owner(),
            app: default_app(),
            sharing: Sharing::default(),
            restart_timeout_secs: default_restart_timeout(),
            restart_poll_secs: default_restart_poll(),
        }
    }
}

impl ProvisionConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "splunk-provision", "provision") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("provision-config.json")
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Management API base URL, e.g. `https://localhost:8089`
    pub fn management_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.mgmt_port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            scheme: self.scheme.clone(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.owner.clone(), self.app.clone(), self.sharing)
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            timeout: Duration::from_secs(self.restart_timeout_secs),
            poll_interval: Duration::from_secs(self.restart_poll_secs),
        }
    }

    /// Configured install root, or the default for the platform and kind.
    pub fn home_for(&self, platform: &Platform) -> PathBuf {
        if let Some(home) = &self.splunk_home {
            return home.clone();
        }
        let default = match (platform, self.service_kind) {
            (Platform::Windows, ServiceKind::Splunk) => provision_windows::msi::DEFAULT_SPLUNK_HOME,
            (Platform::Windows, ServiceKind::SplunkForwarder) => {
                provision_windows::msi::DEFAULT_FORWARDER_HOME
            }
            (_, ServiceKind::Splunk) => provision_linux::tgz::DEFAULT_SPLUNK_HOME,
            (_, ServiceKind::SplunkForwarder) => provision_linux::tgz::DEFAULT_FORWARDER_HOME,
        };
        PathBuf::from(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: ProvisionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.username, "admin");
        assert_eq!(config.mgmt_port, 8089);
        assert_eq!(config.management_url(), "https://localhost:8089");
        assert_eq!(config.service_kind, ServiceKind::Splunk);
        assert_eq!(config.namespace(), Namespace::new("admin", "search", Sharing::User));
        assert_eq!(config.restart_policy().timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("conf").join("config.json");

        let config = ProvisionConfig {
            pkg_url: Some("http://example.com/splunk.tgz".into()),
            splunk_home: Some(PathBuf::from("/data/splunk")),
            service_kind: ServiceKind::SplunkForwarder,
            skip_install: true,
            sharing: Sharing::App,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = ProvisionConfig::load(&path).unwrap();
        assert_eq!(loaded.pkg_url, config.pkg_url);
        assert_eq!(loaded.splunk_home, config.splunk_home);
        assert_eq!(loaded.service_kind, ServiceKind::SplunkForwarder);
        assert!(loaded.skip_install);
        assert_eq!(loaded.sharing, Sharing::App);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProvisionConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn test_home_for_platform() {
        let mut config = ProvisionConfig::default();
        assert_eq!(config.home_for(&Platform::Linux), PathBuf::from("/opt/splunk"));
        assert_eq!(
            config.home_for(&Platform::Windows),
            PathBuf::from(r"C:\Program Files\Splunk")
        );

        config.service_kind = ServiceKind::SplunkForwarder;
        assert_eq!(
            config.home_for(&Platform::Linux),
            PathBuf::from("/opt/splunkforwarder")
        );

        config.splunk_home = Some(PathBuf::from("/srv/splunk"));
        assert_eq!(config.home_for(&Platform::Windows), PathBuf::from("/srv/splunk"));
    }
}
