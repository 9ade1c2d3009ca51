//! Facade over one installed instance: lifecycle through the local CLI and
//! namespace-scoped configuration through the management API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use provision_platform::{CommandResult, CommandRunner, Error, Platform, Result};

use crate::config::ProvisionConfig;
use crate::management::{ConfStanza, Credentials, ManagementClient, RestClient};
use crate::namespace::{Namespace, Sharing};
use crate::runner::ShellRunner;

/// Marker the CLI prints from `status` while splunkd is up
pub const RUNNING_MARKER: &str = "splunkd is running";

/// How long to wait for the instance to come back after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Zero disables waiting
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartInterface {
    #[default]
    Cli,
    Rest,
}

pub struct ServiceHandle {
    splunk_home: PathBuf,
    platform: Platform,
    credentials: Credentials,
    namespace: Namespace,
    restart_policy: RestartPolicy,
    runner: Arc<dyn CommandRunner>,
    client: Arc<dyn ManagementClient>,
}

impl ServiceHandle {
    pub fn new(
        splunk_home: impl Into<PathBuf>,
        platform: Platform,
        credentials: Credentials,
        runner: Arc<dyn CommandRunner>,
        client: Arc<dyn ManagementClient>,
    ) -> Self {
        Self {
            splunk_home: splunk_home.into(),
            platform,
            credentials,
            namespace: Namespace::new("admin", "search", Sharing::User),
            restart_policy: RestartPolicy::default(),
            runner,
            client,
        }
    }

    /// Build a handle with the shell runner and REST client described by `config`.
    pub fn connect(config: &ProvisionConfig, platform: Platform) -> Result<Self> {
        let client = RestClient::new(
            &config.management_url(),
            config.credentials(),
            config.verify_tls,
        )?;
        let runner = ShellRunner::new(platform.clone());
        Ok(Self::new(
            config.home_for(&platform),
            platform,
            config.credentials(),
            Arc::new(runner),
            Arc::new(client),
        )
        .with_namespace(config.namespace())
        .with_restart_policy(config.restart_policy()))
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn splunk_home(&self) -> &Path {
        &self.splunk_home
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn client(&self) -> &dyn ManagementClient {
        self.client.as_ref()
    }

    fn executable(&self) -> PathBuf {
        self.splunk_home
            .join("bin")
            .join(self.platform.cli_executable())
    }

    // ── CLI ───────────────────────────────────────────────────────────────

    /// Run `splunk <args>`, adding `-auth user:pass` when `authenticated`.
    /// Each arg is quoted for the platform shell, so values may carry spaces
    /// or shell metacharacters.
    pub fn cli(&self, args: &[&str], authenticated: bool) -> Result<CommandResult> {
        let quote = |arg: &str| self.platform.quote_arg(arg);
        let mut words = vec![quote(&self.executable().to_string_lossy())];
        words.extend(args.iter().map(|arg| quote(arg)));
        if authenticated {
            words.push("-auth".to_string());
            words.push(quote(&self.credentials.cli_auth()));
        }
        self.runner.run(&words.join(" "))
    }

    /// Authenticated CLI call where a non-zero exit is an error. The error
    /// names the subcommand only, so credentials stay out of diagnostics.
    pub fn cli_checked(&self, args: &[&str]) -> Result<CommandResult> {
        self.cli(args, true)?
            .into_checked(&format!("splunk {}", args.join(" ")))
    }

    pub fn start(&self) -> Result<CommandResult> {
        info!("starting splunkd at {}", self.splunk_home.display());
        self.cli(&["start"], false)
    }

    pub fn stop(&self) -> Result<CommandResult> {
        info!("stopping splunkd at {}", self.splunk_home.display());
        self.cli(&["stop"], false)
    }

    pub fn status(&self) -> Result<CommandResult> {
        self.cli(&["status"], false)
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.status()?.stdout.contains(RUNNING_MARKER))
    }

    /// Restart through the CLI and wait until the instance reports running.
    pub async fn restart(&self) -> Result<()> {
        self.restart_via(RestartInterface::Cli).await
    }

    pub async fn restart_via(&self, interface: RestartInterface) -> Result<()> {
        info!("restarting splunkd via {:?}", interface);
        match interface {
            RestartInterface::Cli => {
                self.cli(&["restart"], false)?.into_checked("splunk restart")?;
            }
            RestartInterface::Rest => self.client.restart().await?,
        }
        self.wait_until_running().await
    }

    async fn wait_until_running(&self) -> Result<()> {
        let policy = self.restart_policy;
        if policy.timeout.is_zero() {
            return Ok(());
        }
        let started = Instant::now();
        loop {
            if self.is_running()? {
                debug!("splunkd running after {:?}", started.elapsed());
                return Ok(());
            }
            if started.elapsed() >= policy.timeout {
                return Err(Error::RestartTimeout {
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    }

    /// Management port reported by `show splunkd-port`, `None` when splunkd is down.
    pub fn mgmt_port(&self) -> Result<Option<u16>> {
        let result = self.cli(&["show", "splunkd-port"], true)?;
        if !result.success() {
            return Ok(None);
        }
        let port = result
            .stdout
            .replace("Splunkd port:", "")
            .trim()
            .parse()
            .ok();
        Ok(port)
    }

    /// `https://<hostname>:<mgmt port>` of this host
    pub fn mgmt_uri(&self) -> Result<String> {
        let port = self.mgmt_port()?.ok_or_else(|| {
            Error::InvalidArgument("management port unavailable, is splunkd running?".into())
        })?;
        let host = hostname::get()
            .map_err(|e| Error::InvalidArgument(format!("cannot resolve hostname: {}", e)))?;
        Ok(format!("https://{}:{}", host.to_string_lossy(), port))
    }

    // ── Configuration ─────────────────────────────────────────────────────

    /// Rebind the default namespace used by conf calls that pass `None`.
    pub fn change_namespace(&mut self, namespace: Namespace) {
        debug!("namespace changed to {}", namespace);
        self.namespace = namespace;
    }

    fn resolve<'a>(&'a self, namespace: Option<&'a Namespace>) -> &'a Namespace {
        namespace.unwrap_or(&self.namespace)
    }

    /// Read a whole stanza. A missing conf file or stanza is logged and
    /// reported as `None`.
    pub async fn read_conf_file(
        &self,
        conf: &str,
        stanza: &str,
        namespace: Option<&Namespace>,
    ) -> Result<Option<ConfStanza>> {
        let ns = self.resolve(namespace);
        if !self.client.conf_exists(ns, conf).await? {
            warn!("no such conf file {} in {}", conf, ns);
            return Ok(None);
        }
        let found = self.client.get_stanza(ns, conf, stanza).await?;
        if found.is_none() {
            warn!("no such stanza [{}] in {}.conf", stanza, conf);
        }
        Ok(found)
    }

    /// Read one key of a stanza; `None` (with a warning) when anything is missing.
    pub async fn read_conf_key(
        &self,
        conf: &str,
        stanza: &str,
        key: &str,
        namespace: Option<&Namespace>,
    ) -> Result<Option<serde_json::Value>> {
        let Some(found) = self.read_conf_file(conf, stanza, namespace).await? else {
            return Ok(None);
        };
        let value = found.content.get(key).cloned();
        if value.is_none() {
            warn!("no such key {} in [{}] of {}.conf", key, stanza, conf);
        }
        Ok(value)
    }

    /// Create the stanza if needed, submit `data`, and optionally restart.
    pub async fn edit_conf_file(
        &self,
        conf: &str,
        stanza: &str,
        data: &BTreeMap<String, String>,
        namespace: Option<&Namespace>,
        restart: bool,
    ) -> Result<()> {
        let ns = self.resolve(namespace);
        info!("editing [{}] in {}.conf ({})", stanza, conf, ns);

        if self.client.get_stanza(ns, conf, stanza).await?.is_none() {
            match self.client.create_stanza(ns, conf, stanza).await {
                Ok(()) => {}
                Err(Error::StanzaExists { .. }) => {
                    warn!("stanza [{}] already exists in {}.conf", stanza, conf);
                }
                Err(e) => return Err(e),
            }
        }

        self.client.submit_stanza(ns, conf, stanza, data).await?;

        if restart {
            self.restart().await?;
        }
        Ok(())
    }

    /// `None` when the conf file itself is missing, otherwise whether the
    /// stanza exists in it.
    pub async fn stanza_exists(
        &self,
        conf: &str,
        stanza: &str,
        namespace: Option<&Namespace>,
    ) -> Result<Option<bool>> {
        let ns = self.resolve(namespace);
        if !self.client.conf_exists(ns, conf).await? {
            warn!("no such conf file {} in {}", conf, ns);
            return Ok(None);
        }
        Ok(Some(self.client.get_stanza(ns, conf, stanza).await?.is_some()))
    }
}
