use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use provision_core::config::ProvisionConfig;
use provision_core::namespace::{Namespace, Sharing};
use provision_core::ServiceKind;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "splunk-provision")]
#[command(about = "Install, configure and cluster Splunk instances")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, env = "PROVISION_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PROVISION_LOG_LEVEL", global = true)]
    log_level: String,

    /// Install root of the instance (default: platform-specific)
    #[arg(long, env = "SPLUNK_HOME", global = true)]
    splunk_home: Option<PathBuf>,

    /// Admin user for the CLI and management API
    #[arg(long, env = "SPLUNK_USERNAME", global = true)]
    username: Option<String>,

    #[arg(long, env = "SPLUNK_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a package and install it
    Install {
        /// Package URL (falls back to pkg_url in the config file)
        #[arg(long)]
        pkg_url: Option<String>,

        /// splunk or splunkforwarder
        #[arg(long)]
        kind: Option<ServiceKind>,

        /// Reinstall over an existing installation
        #[arg(long)]
        upgrade: bool,

        /// Leave the service stopped after install
        #[arg(long)]
        no_start: bool,

        /// Expected SHA-256 of the package
        #[arg(long)]
        sha256: Option<String>,

        /// Extra installer flag as KEY=VALUE, repeatable
        #[arg(long = "flag", value_parser = parse_key_val)]
        flags: Vec<(String, String)>,
    },
    /// Stop the service and remove the installation
    Uninstall {
        /// Package the instance was installed from
        #[arg(long)]
        pkg_path: PathBuf,

        #[arg(long)]
        kind: Option<ServiceKind>,
    },
    Start,
    Stop,
    Status,
    /// Read and edit configuration stanzas
    Conf {
        #[command(subcommand)]
        action: ConfCommand,
    },
    /// Configure a cluster or topology role
    Cluster {
        #[command(subcommand)]
        role: ClusterCommand,
    },
    License {
        #[command(subcommand)]
        action: LicenseCommand,
    },
}

/// Overrides for the namespace from the config file.
#[derive(Args, Debug, Default)]
struct NamespaceArgs {
    #[arg(long)]
    owner: Option<String>,

    #[arg(long)]
    app: Option<String>,

    /// user, app, global or system
    #[arg(long)]
    sharing: Option<Sharing>,
}

impl NamespaceArgs {
    /// `None` when nothing was overridden, so the handle default applies.
    fn resolve(&self, default: &Namespace) -> Option<Namespace> {
        if self.owner.is_none() && self.app.is_none() && self.sharing.is_none() {
            return None;
        }
        Some(Namespace {
            owner: self.owner.clone().or_else(|| default.owner.clone()),
            app: self.app.clone().or_else(|| default.app.clone()),
            sharing: self.sharing.unwrap_or(default.sharing),
        })
    }
}

#[derive(Subcommand, Debug)]
enum ConfCommand {
    /// Print a stanza, or one key of it
    Get {
        conf: String,
        stanza: String,
        key: Option<String>,
        #[command(flatten)]
        namespace: NamespaceArgs,
    },
    /// Create or update a stanza
    Set {
        conf: String,
        stanza: String,
        /// KEY=VALUE, repeatable
        #[arg(long = "data", value_parser = parse_key_val)]
        data: Vec<(String, String)>,
        /// Skip the restart after writing
        #[arg(long)]
        no_restart: bool,
        #[command(flatten)]
        namespace: NamespaceArgs,
    },
    /// Print true/false, or null when the conf file is missing
    Exists {
        conf: String,
        stanza: String,
        #[command(flatten)]
        namespace: NamespaceArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ClusterCommand {
    /// Indexer cluster master
    Master {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        label: String,
        #[arg(long, default_value_t = 2)]
        replication_factor: u32,
        #[arg(long, default_value_t = 2)]
        search_factor: u32,
        #[arg(long, default_value_t = 1)]
        sites: u32,
        #[arg(long, default_value = "origin:2,total:3")]
        site_replication_factor: String,
        #[arg(long, default_value = "origin:2,total:3")]
        site_search_factor: String,
    },
    /// Indexer cluster peer
    Peer {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        label: String,
        /// <host>:<port> of the master
        #[arg(long)]
        master_uri: String,
        #[arg(long, default_value_t = 9887)]
        replication_port: u16,
        #[arg(long)]
        site: Option<String>,
    },
    /// Indexer cluster search head
    SearchHead {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        label: String,
        #[arg(long)]
        master_uri: String,
        #[arg(long)]
        site: Option<String>,
    },
    /// Search head cluster deployer
    Deployer {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        label: String,
    },
    /// Search head cluster member
    ShcMember {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        label: String,
        #[arg(long)]
        replication_port: u16,
        /// Deployer management URI
        #[arg(long)]
        deployer_url: String,
        #[arg(long)]
        replication_factor: Option<u32>,
        /// Advertised URI of this member (default: from hostname)
        #[arg(long)]
        mgmt_uri: Option<String>,
    },
    /// Elect the first search head cluster captain
    BootstrapCaptain {
        /// Member management URI, repeatable
        #[arg(long = "member", required = true)]
        members: Vec<String>,
    },
    /// Add distributed search peers
    SearchPeer {
        /// <host>:<port>, repeatable
        #[arg(long = "peer", required = true)]
        peers: Vec<String>,
        #[arg(long, default_value = "admin")]
        remote_username: String,
        #[arg(long, default_value = "changeme")]
        remote_password: String,
    },
    /// Remove distributed search peers
    RemoveSearchPeer {
        #[arg(long = "peer", required = true)]
        peers: Vec<String>,
    },
    /// Poll a deployment server
    DeploymentClient {
        #[arg(long)]
        server: String,
    },
    /// Use a remote license master
    LicenseSlave {
        #[arg(long)]
        master_uri: String,
    },
}

#[derive(Subcommand, Debug)]
enum LicenseCommand {
    /// Add a license file and restart
    Add {
        /// Falls back to license_path in the config file
        path: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_config(cli: &Cli) -> Result<ProvisionConfig> {
    let config_path = cli
        .config_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(ProvisionConfig::default_path);

    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        ProvisionConfig::load(&config_path)?
    } else {
        ProvisionConfig::default()
    };

    // CLI args override config file
    if let Some(home) = &cli.splunk_home {
        config.splunk_home = Some(home.clone());
    }
    if let Some(username) = &cli.username {
        config.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(
        "splunk-provision v{} (os={}, arch={})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    );

    let config = load_config(&cli)?;
    commands::dispatch(cli.command, config).await
}
