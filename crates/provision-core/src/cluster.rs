//! Role and topology workflows: indexer clustering, search head clustering,
//! distributed search, deployment and licensing.
//!
//! Every server.conf write goes to the system namespace. Multi-site roles
//! write `[general] site` before the clustering stanza.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use provision_platform::installer::ensure_dir;
use provision_platform::Result;

use crate::namespace::Namespace;
use crate::service::ServiceHandle;

/// Indexer cluster master settings.
#[derive(Debug, Clone)]
pub struct ClusterMasterConfig {
    pub pass4_symm_key: String,
    pub cluster_label: String,
    pub replication_factor: u32,
    pub search_factor: u32,
    /// More than one site switches the cluster to multisite
    pub number_of_sites: u32,
    pub site_replication_factor: String,
    pub site_search_factor: String,
}

impl ClusterMasterConfig {
    pub fn new(pass4_symm_key: impl Into<String>, cluster_label: impl Into<String>) -> Self {
        Self {
            pass4_symm_key: pass4_symm_key.into(),
            cluster_label: cluster_label.into(),
            replication_factor: 2,
            search_factor: 2,
            number_of_sites: 1,
            site_replication_factor: "origin:2,total:3".to_string(),
            site_search_factor: "origin:2,total:3".to_string(),
        }
    }

    fn available_sites(&self) -> String {
        (1..=self.number_of_sites)
            .map(|i| format!("site{}", i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Indexer cluster peer (slave) settings.
#[derive(Debug, Clone)]
pub struct ClusterPeerConfig {
    pub pass4_symm_key: String,
    pub cluster_label: String,
    /// `<host>:<port>` of the master's management interface
    pub master_uri: String,
    pub replication_port: u16,
    pub site: Option<String>,
}

impl ClusterPeerConfig {
    pub fn new(
        pass4_symm_key: impl Into<String>,
        cluster_label: impl Into<String>,
        master_uri: impl Into<String>,
    ) -> Self {
        Self {
            pass4_symm_key: pass4_symm_key.into(),
            cluster_label: cluster_label.into(),
            master_uri: master_uri.into(),
            replication_port: 9887,
            site: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHeadConfig {
    pub pass4_symm_key: String,
    pub cluster_label: String,
    pub master_uri: String,
    pub site: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShclusterMemberConfig {
    pub pass4_symm_key: String,
    pub shcluster_label: String,
    pub replication_port: u16,
    /// Deployer management URI; `https://` is prepended when missing
    pub conf_deploy_fetch_url: String,
    /// Splunk's own default when unset
    pub replication_factor: Option<u32>,
    /// Advertised URI of this member; derived from the local hostname when unset
    pub mgmt_uri: Option<String>,
}

fn stanza(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn https(uri: &str) -> String {
    if uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!("https://{}", uri)
    }
}

impl ServiceHandle {
    async fn edit_server_conf(
        &self,
        stanza_name: &str,
        data: &BTreeMap<String, String>,
        restart: bool,
    ) -> Result<()> {
        self.edit_conf_file("server", stanza_name, data, Some(&Namespace::system()), restart)
            .await
    }

    async fn set_site(&self, site: &str) -> Result<()> {
        self.edit_server_conf("general", &stanza(&[("site", site.to_string())]), false)
            .await
    }

    // ── Indexer clustering ────────────────────────────────────────────────

    pub async fn config_cluster_master(&self, config: &ClusterMasterConfig) -> Result<()> {
        info!("configuring cluster master {}", config.cluster_label);
        let data = if config.number_of_sites > 1 {
            self.set_site("site1").await?;
            stanza(&[
                ("mode", "master".into()),
                ("cluster_label", config.cluster_label.clone()),
                ("pass4SymmKey", config.pass4_symm_key.clone()),
                ("multisite", "true".into()),
                ("available_sites", config.available_sites()),
                ("site_replication_factor", config.site_replication_factor.clone()),
                ("site_search_factor", config.site_search_factor.clone()),
            ])
        } else {
            stanza(&[
                ("mode", "master".into()),
                ("cluster_label", config.cluster_label.clone()),
                ("pass4SymmKey", config.pass4_symm_key.clone()),
                ("replication_factor", config.replication_factor.to_string()),
                ("search_factor", config.search_factor.to_string()),
            ])
        };
        self.edit_server_conf("clustering", &data, true).await
    }

    pub async fn config_cluster_slave(&self, config: &ClusterPeerConfig) -> Result<()> {
        info!("configuring cluster peer of {}", config.master_uri);
        let replication = format!("replication_port://{}", config.replication_port);
        self.edit_server_conf(&replication, &BTreeMap::new(), false)
            .await?;

        if let Some(site) = &config.site {
            self.set_site(site).await?;
        }

        let data = stanza(&[
            ("mode", "slave".into()),
            ("cluster_label", config.cluster_label.clone()),
            ("pass4SymmKey", config.pass4_symm_key.clone()),
            ("master_uri", https(&config.master_uri)),
        ]);
        self.edit_server_conf("clustering", &data, true).await
    }

    pub async fn config_cluster_searchhead(&self, config: &SearchHeadConfig) -> Result<()> {
        info!("configuring cluster search head of {}", config.master_uri);
        let mut data = stanza(&[
            ("mode", "searchhead".into()),
            ("cluster_label", config.cluster_label.clone()),
            ("pass4SymmKey", config.pass4_symm_key.clone()),
            ("master_uri", https(&config.master_uri)),
        ]);
        if let Some(site) = &config.site {
            self.set_site(site).await?;
            data.insert("multisite".into(), "true".into());
        }
        self.edit_server_conf("clustering", &data, true).await
    }

    // ── Search head clustering ────────────────────────────────────────────

    pub async fn config_shcluster_deployer(
        &self,
        pass4_symm_key: &str,
        shcluster_label: &str,
    ) -> Result<()> {
        info!("configuring shcluster deployer {}", shcluster_label);
        let data = stanza(&[
            ("pass4SymmKey", pass4_symm_key.to_string()),
            ("shcluster_label", shcluster_label.to_string()),
        ]);
        self.edit_server_conf("shclustering", &data, true).await
    }

    pub async fn config_shcluster_member(&self, config: &ShclusterMemberConfig) -> Result<()> {
        let mgmt_uri = match &config.mgmt_uri {
            Some(uri) => uri.clone(),
            None => self.mgmt_uri()?,
        };
        info!("configuring shcluster member {}", mgmt_uri);

        let replication_port = config.replication_port.to_string();
        let replication_factor = config.replication_factor.map(|f| f.to_string());
        let fetch_url = https(&config.conf_deploy_fetch_url);

        let mut args: Vec<&str> = vec![
            "init",
            "shcluster-config",
            "-mgmt_uri",
            &mgmt_uri,
            "-replication_port",
            &replication_port,
        ];
        if let Some(factor) = &replication_factor {
            args.extend(["-replication_factor", factor.as_str()]);
        }
        args.extend([
            "-conf_deploy_fetch_url",
            fetch_url.as_str(),
            "-secret",
            config.pass4_symm_key.as_str(),
            "-shcluster_label",
            config.shcluster_label.as_str(),
        ]);
        self.cli_checked(&args)?;
        self.restart().await
    }

    /// `members` are full management URIs, e.g. `https://10.0.0.2:8089`.
    pub async fn bootstrap_shcluster_captain(&self, members: &[String]) -> Result<()> {
        info!("bootstrapping shcluster captain over {} members", members.len());
        let servers = members.join(",");
        self.cli_checked(&["bootstrap", "shcluster-captain", "-servers_list", &servers])?;
        Ok(())
    }

    // ── Distributed search ────────────────────────────────────────────────

    /// Add each `<host>:<port>` peer, stopping at the first failure.
    pub async fn config_search_peer(
        &self,
        peers: &[String],
        remote_username: &str,
        remote_password: &str,
    ) -> Result<()> {
        for peer in peers {
            info!("adding search peer {}", peer);
            self.cli_checked(&[
                "add",
                "search-server",
                "-host",
                peer,
                "-remoteUsername",
                remote_username,
                "-remotePassword",
                remote_password,
            ])?;
        }
        Ok(())
    }

    pub async fn remove_search_peer(&self, peers: &[String]) -> Result<()> {
        for peer in peers {
            info!("removing search peer {}", peer);
            self.cli_checked(&["remove", "search-server", "-url", peer])?;
        }
        Ok(())
    }

    // ── Deployment, forwarding and licensing ──────────────────────────────

    pub async fn config_deployment_client(&self, server: &str) -> Result<()> {
        info!("polling deployment server {}", server);
        self.cli_checked(&["set", "deploy-poll", server])?;
        self.restart().await
    }

    /// Creates `etc/deployment-apps/<name>` under the install root.
    pub fn add_deployment_app(&self, name: &str) -> Result<PathBuf> {
        let dir = self
            .splunk_home()
            .join("etc")
            .join("deployment-apps")
            .join(name);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    pub async fn config_license_slave(&self, master_uri: &str) -> Result<()> {
        info!("pointing license at {}", master_uri);
        let data = stanza(&[("master_uri", master_uri.to_string())]);
        self.edit_server_conf("license", &data, true).await
    }

    pub async fn add_license(&self, path: &Path) -> Result<()> {
        info!("adding license {}", path.display());
        self.cli_checked(&["add", "license", &path.to_string_lossy()])?;
        self.restart().await
    }

    pub fn enable_listen(&self, port: u16) -> Result<()> {
        self.cli_checked(&["enable", "listen", &port.to_string()])?;
        Ok(())
    }

    pub fn add_forward_server(&self, server: &str) -> Result<()> {
        self.cli_checked(&["add", "forward-server", server])?;
        Ok(())
    }

    // ── Bulk fixtures ─────────────────────────────────────────────────────

    /// Create `<prefix>0..<prefix>{count-1}`, each with its own name as password.
    pub async fn create_users(&self, count: usize, prefix: &str, roles: &[String]) -> Result<()> {
        for i in 0..count {
            let name = format!("{}{}", prefix, i);
            self.client().create_user(&name, &name, roles).await?;
        }
        Ok(())
    }

    /// Saved searches go to the handle's default namespace.
    pub async fn create_saved_searches(
        &self,
        count: usize,
        search: &str,
        prefix: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<()> {
        for i in 0..count {
            let name = format!("{}{}", prefix, i);
            self.client()
                .create_saved_search(self.namespace(), &name, search, extra)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::tests::handle;
    use provision_platform::{CommandResult, Error, Platform};
    use serde_json::json;

    #[tokio::test]
    async fn test_single_site_master() {
        let (handle, runner, store) = handle();
        handle
            .config_cluster_master(&ClusterMasterConfig::new("s3cret", "idxc"))
            .await
            .unwrap();

        let content = store.stanza(&Namespace::system(), "server", "clustering").unwrap();
        let expected: BTreeMap<String, serde_json::Value> = [
            ("mode", json!("master")),
            ("cluster_label", json!("idxc")),
            ("pass4SymmKey", json!("s3cret")),
            ("replication_factor", json!("2")),
            ("search_factor", json!("2")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(content, expected);
        assert!(store.stanza(&Namespace::system(), "server", "general").is_none());
        assert_eq!(runner.calls_matching("splunk restart").len(), 1);
    }

    #[tokio::test]
    async fn test_multisite_master_writes_site_first() {
        let (handle, _, store) = handle();
        let mut config = ClusterMasterConfig::new("s3cret", "idxc");
        config.number_of_sites = 3;
        handle.config_cluster_master(&config).await.unwrap();

        let ns = Namespace::system();
        let general = store.stanza(&ns, "server", "general").unwrap();
        assert_eq!(general.get("site"), Some(&json!("site1")));

        let clustering = store.stanza(&ns, "server", "clustering").unwrap();
        assert_eq!(clustering.get("multisite"), Some(&json!("true")));
        assert_eq!(
            clustering.get("available_sites"),
            Some(&json!("site1, site2, site3"))
        );
        assert!(clustering.get("replication_factor").is_none());
    }

    #[tokio::test]
    async fn test_repeated_master_config_keeps_one_stanza() {
        let (handle, _, store) = handle();
        let mut config = ClusterMasterConfig::new("s3cret", "idxc");
        handle.config_cluster_master(&config).await.unwrap();
        config.replication_factor = 3;
        handle.config_cluster_master(&config).await.unwrap();

        let content = store.stanza(&Namespace::system(), "server", "clustering").unwrap();
        assert_eq!(content.get("replication_factor"), Some(&json!("3")));
        assert_eq!(content.get("mode"), Some(&json!("master")));
    }

    #[tokio::test]
    async fn test_cluster_slave() {
        let (handle, _, store) = handle();
        let mut config = ClusterPeerConfig::new("s3cret", "idxc", "10.0.0.1:8089");
        config.site = Some("site2".into());
        handle.config_cluster_slave(&config).await.unwrap();

        let ns = Namespace::system();
        assert!(store.stanza(&ns, "server", "replication_port://9887").is_some());
        assert_eq!(
            store.stanza(&ns, "server", "general").unwrap().get("site"),
            Some(&json!("site2"))
        );
        let clustering = store.stanza(&ns, "server", "clustering").unwrap();
        assert_eq!(clustering.get("mode"), Some(&json!("slave")));
        assert_eq!(clustering.get("master_uri"), Some(&json!("https://10.0.0.1:8089")));
    }

    #[tokio::test]
    async fn test_searchhead_multisite_flag() {
        let (handle, _, store) = handle();
        let config = SearchHeadConfig {
            pass4_symm_key: "s3cret".into(),
            cluster_label: "idxc".into(),
            master_uri: "https://10.0.0.1:8089".into(),
            site: None,
        };
        handle.config_cluster_searchhead(&config).await.unwrap();
        let clustering = store.stanza(&Namespace::system(), "server", "clustering").unwrap();
        assert_eq!(clustering.get("mode"), Some(&json!("searchhead")));
        assert_eq!(clustering.get("master_uri"), Some(&json!("https://10.0.0.1:8089")));
        assert!(clustering.get("multisite").is_none());
    }

    #[tokio::test]
    async fn test_shcluster_member_command() {
        let (handle, runner, _) = handle();
        let config = ShclusterMemberConfig {
            pass4_symm_key: "s3cret".into(),
            shcluster_label: "shc".into(),
            replication_port: 9200,
            conf_deploy_fetch_url: "10.0.0.9:8089".into(),
            replication_factor: Some(3),
            mgmt_uri: Some("https://10.0.0.2:8089".into()),
        };
        handle.config_shcluster_member(&config).await.unwrap();

        let init = runner.calls_matching("init shcluster-config");
        assert_eq!(init.len(), 1);
        assert!(init[0].contains(
            "init shcluster-config -mgmt_uri https://10.0.0.2:8089 -replication_port 9200 \
             -replication_factor 3 -conf_deploy_fetch_url https://10.0.0.9:8089 \
             -secret s3cret -shcluster_label shc -auth admin:changeme"
        ));
        assert_eq!(runner.calls_matching("splunk restart").len(), 1);
    }

    #[tokio::test]
    async fn test_secrets_are_single_words() {
        let (handle, runner, _) = handle();
        let config = ShclusterMemberConfig {
            pass4_symm_key: "my secret;rm -rf x".into(),
            shcluster_label: "shc".into(),
            replication_port: 9200,
            conf_deploy_fetch_url: "10.0.0.9:8089".into(),
            replication_factor: None,
            mgmt_uri: Some("https://10.0.0.2:8089".into()),
        };
        handle.config_shcluster_member(&config).await.unwrap();
        let init = runner.calls_matching("init shcluster-config");
        assert!(init[0].contains("-secret 'my secret;rm -rf x' -shcluster_label shc"));
        assert!(!init[0].contains("-replication_factor"));

        let peers = vec!["idx1:8089".to_string()];
        handle
            .config_search_peer(&peers, "admin", "pa$word")
            .await
            .unwrap();
        assert_eq!(
            runner.calls_matching("-remoteUsername admin -remotePassword 'pa$word' -auth").len(),
            1
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_metacharacters_reach_cli_verbatim() {
        use std::os::unix::fs::PermissionsExt;

        use crate::management::Credentials;
        use crate::memory::InMemoryConfStore;
        use crate::runner::ShellRunner;
        use crate::service::RestartPolicy;

        let tmp = tempfile::tempdir().unwrap();
        let args_file = tmp.path().join("args");
        let marker = tmp.path().join("PWNED");
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let script = bin.join("splunk");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '[%s]' \"$@\" >> '{0}'\necho >> '{0}'\n",
                args_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let credentials = Credentials {
            password: "pa$word".into(),
            ..Credentials::default()
        };
        let handle = crate::service::ServiceHandle::new(
            tmp.path(),
            Platform::Linux,
            credentials,
            Arc::new(ShellRunner::new(Platform::Linux)),
            Arc::new(InMemoryConfStore::new()),
        )
        .with_restart_policy(RestartPolicy {
            timeout: std::time::Duration::ZERO,
            poll_interval: std::time::Duration::ZERO,
        });

        let config = ShclusterMemberConfig {
            pass4_symm_key: format!("my secret;touch {}", marker.display()),
            shcluster_label: "shc".into(),
            replication_port: 9200,
            conf_deploy_fetch_url: "10.0.0.9:8089".into(),
            replication_factor: None,
            mgmt_uri: Some("https://10.0.0.2:8089".into()),
        };
        handle.config_shcluster_member(&config).await.unwrap();

        let recorded = std::fs::read_to_string(&args_file).unwrap();
        let first = recorded.lines().next().unwrap();
        assert_eq!(
            first,
            format!(
                "[init][shcluster-config][-mgmt_uri][https://10.0.0.2:8089]\
                 [-replication_port][9200][-conf_deploy_fetch_url][https://10.0.0.9:8089]\
                 [-secret][my secret;touch {}][-shcluster_label][shc][-auth][admin:pa$word]",
                marker.display()
            )
        );
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_search_peer_failure_stops() {
        let (handle, runner, _) = handle();
        runner.respond("-host idx1", CommandResult::new(1, "", "peer unreachable"));
        let peers = vec!["idx1:8089".to_string(), "idx2:8089".to_string()];

        let err = handle
            .config_search_peer(&peers, "admin", "changeme")
            .await
            .unwrap_err();
        match err {
            Error::CommandExecution { output, .. } => assert!(output.contains("peer unreachable")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.calls_matching("idx2").is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_captain_does_not_restart() {
        let (handle, runner, _) = handle();
        let members = vec![
            "https://10.0.0.2:8089".to_string(),
            "https://10.0.0.3:8089".to_string(),
        ];
        handle.bootstrap_shcluster_captain(&members).await.unwrap();
        assert_eq!(
            runner.calls_matching("-servers_list https://10.0.0.2:8089,https://10.0.0.3:8089").len(),
            1
        );
        assert!(runner.calls_matching("splunk restart").is_empty());
    }

    #[tokio::test]
    async fn test_deployment_client_restart_failure() {
        let (handle, runner, _) = handle();
        runner.respond("splunk restart", CommandResult::new(1, "", "cannot restart"));
        let err = handle.config_deployment_client("ds:8089").await.unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
        assert_eq!(runner.calls_matching("set deploy-poll ds:8089").len(), 1);
    }

    #[tokio::test]
    async fn test_license_slave_and_add_license() {
        let (handle, runner, store) = handle();
        handle
            .config_license_slave("https://lm:8089")
            .await
            .unwrap();
        let license = store.stanza(&Namespace::system(), "server", "license").unwrap();
        assert_eq!(license.get("master_uri"), Some(&json!("https://lm:8089")));

        handle
            .add_license(Path::new("/tmp/splunk.lic"))
            .await
            .unwrap();
        assert_eq!(runner.calls_matching("add license /tmp/splunk.lic -auth").len(), 1);
    }

    #[test]
    fn test_add_deployment_app() {
        let tmp = tempfile::tempdir().unwrap();
        let (handle, runner, store) = handle();
        let handle = crate::service::ServiceHandle::new(
            tmp.path(),
            Platform::Linux,
            handle.credentials().clone(),
            runner,
            store,
        );
        let dir = handle.add_deployment_app("my_app").unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("etc/deployment-apps/my_app"));
    }

    #[tokio::test]
    async fn test_bulk_users_and_searches() {
        let (handle, _, store) = handle();
        handle
            .create_users(3, "user", &["user".to_string()])
            .await
            .unwrap();
        let users = store.users();
        assert_eq!(users.len(), 3);
        assert_eq!(users[2].0, "user2");

        handle
            .create_saved_searches(2, "index=_internal", "search", &BTreeMap::new())
            .await
            .unwrap();
        let searches = store.saved_searches();
        assert_eq!(searches[1].name, "search1");
        assert_eq!(&searches[1].namespace, handle.namespace());
    }

    #[test]
    fn test_enable_listen_and_forward_server() {
        let (handle, runner, _) = handle();
        handle.enable_listen(9997).unwrap();
        handle.add_forward_server("idx1:9997").unwrap();
        assert_eq!(runner.calls_matching("enable listen 9997 -auth").len(), 1);
        assert_eq!(runner.calls_matching("add forward-server idx1:9997 -auth").len(), 1);
    }
}
