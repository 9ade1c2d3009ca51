//! Install, configure and cluster Splunk instances.
//!
//! The flow is: [`fetch::PackageFetcher`] downloads the package,
//! [`factory::create_installer`] picks a strategy for the platform and
//! package type, and a [`service::ServiceHandle`] then drives the installed
//! instance through its CLI and management API.

pub mod cluster;
pub mod config;
pub mod factory;
pub mod fetch;
pub mod install;
pub mod management;
pub mod namespace;
pub mod runner;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use provision_platform::{
    CommandResult, CommandRunner, Error, InstallOptions, Installer, Platform, Result, ServiceKind,
};
