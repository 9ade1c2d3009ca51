use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use provision_core::cluster::{
    ClusterMasterConfig, ClusterPeerConfig, SearchHeadConfig, ShclusterMemberConfig,
};
use provision_core::config::ProvisionConfig;
use provision_core::factory::create_installer;
use provision_core::fetch::PackageFetcher;
use provision_core::install::{install, InstallRequest, ALREADY_INSTALLED_EXIT_CODE};
use provision_core::runner::ShellRunner;
use provision_core::service::ServiceHandle;
use provision_core::{CommandResult, InstallOptions, Platform};

use crate::{ClusterCommand, Commands, ConfCommand, LicenseCommand};

pub(crate) async fn dispatch(command: Commands, config: ProvisionConfig) -> Result<()> {
    let platform = Platform::current();

    match command {
        Commands::Install {
            pkg_url,
            kind,
            upgrade,
            no_start,
            sha256,
            flags,
        } => {
            if config.skip_install {
                info!("skip_install is set, leaving the existing instance alone");
                return Ok(());
            }
            let pkg_url = pkg_url
                .or_else(|| config.pkg_url.clone())
                .context("no package URL given (--pkg-url or pkg_url in config)")?;
            let kind = kind.unwrap_or(config.service_kind);

            let mut request = InstallRequest::new(pkg_url, kind);
            request.install_root = Some(
                ProvisionConfig {
                    service_kind: kind,
                    ..config.clone()
                }
                .home_for(&platform),
            );
            request.upgrade = upgrade;
            request.sha256 = sha256;
            request.options = InstallOptions {
                start_after_install: !no_start,
                extra_flags: flags.into_iter().collect(),
            };

            let runner = Arc::new(ShellRunner::new(platform.clone()));
            let outcome = install(&request, &platform, runner, &PackageFetcher::new()).await?;
            report_install(&outcome.result)
        }

        Commands::Uninstall { pkg_path, kind } => {
            let kind = kind.unwrap_or(config.service_kind);
            let home = ProvisionConfig {
                service_kind: kind,
                ..config
            }
            .home_for(&platform);
            let runner = Arc::new(ShellRunner::new(platform.clone()));
            let mut installer = create_installer(&platform, &pkg_path, kind, Some(home), runner)?;
            installer.uninstall()?;
            info!("uninstalled {} from {}", kind, installer.install_root().display());
            Ok(())
        }

        Commands::Start => print_result(&connect(&config, platform)?.start()?),
        Commands::Stop => print_result(&connect(&config, platform)?.stop()?),
        Commands::Status => {
            let result = connect(&config, platform)?.status()?;
            println!("{}", result.stdout.trim());
            Ok(())
        }

        Commands::Conf { action } => {
            let handle = connect(&config, platform)?;
            run_conf(&handle, action).await
        }

        Commands::Cluster { role } => {
            let handle = connect(&config, platform)?;
            run_cluster(&handle, role).await
        }

        Commands::License {
            action: LicenseCommand::Add { path },
        } => {
            let path = path
                .or_else(|| config.license_path.clone())
                .context("no license file given (argument or license_path in config)")?;
            let handle = connect(&config, platform)?;
            handle.add_license(&path).await?;
            Ok(())
        }
    }
}

fn connect(config: &ProvisionConfig, platform: Platform) -> Result<ServiceHandle> {
    ServiceHandle::connect(config, platform).context("failed to set up service handle")
}

fn report_install(result: &CommandResult) -> Result<()> {
    if result.exit_code == ALREADY_INSTALLED_EXIT_CODE {
        warn!("already installed; pass --upgrade to reinstall");
        return Ok(());
    }
    if !result.success() {
        bail!(
            "install failed with exit code {}: {}",
            result.exit_code,
            result.combined_output().trim()
        );
    }
    println!("{}", result.stdout.trim());
    Ok(())
}

fn print_result(result: &CommandResult) -> Result<()> {
    if !result.success() {
        bail!(
            "command failed with exit code {}: {}",
            result.exit_code,
            result.combined_output().trim()
        );
    }
    println!("{}", result.stdout.trim());
    Ok(())
}

async fn run_conf(handle: &ServiceHandle, action: ConfCommand) -> Result<()> {
    match action {
        ConfCommand::Get {
            conf,
            stanza,
            key,
            namespace,
        } => {
            let ns = namespace.resolve(handle.namespace());
            let value = match key {
                Some(key) => handle
                    .read_conf_key(&conf, &stanza, &key, ns.as_ref())
                    .await?
                    .unwrap_or(serde_json::Value::Null),
                None => handle
                    .read_conf_file(&conf, &stanza, ns.as_ref())
                    .await?
                    .map(|s| serde_json::to_value(s.content))
                    .transpose()?
                    .unwrap_or(serde_json::Value::Null),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ConfCommand::Set {
            conf,
            stanza,
            data,
            no_restart,
            namespace,
        } => {
            let ns = namespace.resolve(handle.namespace());
            let data: BTreeMap<String, String> = data.into_iter().collect();
            handle
                .edit_conf_file(&conf, &stanza, &data, ns.as_ref(), !no_restart)
                .await?;
        }
        ConfCommand::Exists {
            conf,
            stanza,
            namespace,
        } => {
            let ns = namespace.resolve(handle.namespace());
            match handle.stanza_exists(&conf, &stanza, ns.as_ref()).await? {
                Some(exists) => println!("{}", exists),
                None => println!("null"),
            }
        }
    }
    Ok(())
}

async fn run_cluster(handle: &ServiceHandle, role: ClusterCommand) -> Result<()> {
    match role {
        ClusterCommand::Master {
            secret,
            label,
            replication_factor,
            search_factor,
            sites,
            site_replication_factor,
            site_search_factor,
        } => {
            let config = ClusterMasterConfig {
                replication_factor,
                search_factor,
                number_of_sites: sites,
                site_replication_factor,
                site_search_factor,
                ..ClusterMasterConfig::new(secret, label)
            };
            handle.config_cluster_master(&config).await?;
        }
        ClusterCommand::Peer {
            secret,
            label,
            master_uri,
            replication_port,
            site,
        } => {
            let config = ClusterPeerConfig {
                replication_port,
                site,
                ..ClusterPeerConfig::new(secret, label, master_uri)
            };
            handle.config_cluster_slave(&config).await?;
        }
        ClusterCommand::SearchHead {
            secret,
            label,
            master_uri,
            site,
        } => {
            let config = SearchHeadConfig {
                pass4_symm_key: secret,
                cluster_label: label,
                master_uri,
                site,
            };
            handle.config_cluster_searchhead(&config).await?;
        }
        ClusterCommand::Deployer { secret, label } => {
            handle.config_shcluster_deployer(&secret, &label).await?;
        }
        ClusterCommand::ShcMember {
            secret,
            label,
            replication_port,
            deployer_url,
            replication_factor,
            mgmt_uri,
        } => {
            let config = ShclusterMemberConfig {
                pass4_symm_key: secret,
                shcluster_label: label,
                replication_port,
                conf_deploy_fetch_url: deployer_url,
                replication_factor,
                mgmt_uri,
            };
            handle.config_shcluster_member(&config).await?;
        }
        ClusterCommand::BootstrapCaptain { members } => {
            handle.bootstrap_shcluster_captain(&members).await?;
        }
        ClusterCommand::SearchPeer {
            peers,
            remote_username,
            remote_password,
        } => {
            handle
                .config_search_peer(&peers, &remote_username, &remote_password)
                .await?;
        }
        ClusterCommand::RemoveSearchPeer { peers } => {
            handle.remove_search_peer(&peers).await?;
        }
        ClusterCommand::DeploymentClient { server } => {
            handle.config_deployment_client(&server).await?;
        }
        ClusterCommand::LicenseSlave { master_uri } => {
            handle.config_license_slave(&master_uri).await?;
        }
    }
    info!("done");
    Ok(())
}
