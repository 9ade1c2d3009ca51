//! Error taxonomy shared by the installers, the fetcher and the service facade.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure while talking HTTP (download or management API)
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// Server answered with a non-success status during a download
    #[error("unexpected HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Install path or package file could not be created, written or removed
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    /// A CLI or installer tool exited non-zero; `output` is stdout + stderr
    #[error("command `{command}` failed: {output}")]
    CommandExecution { command: String, output: String },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The management API rejected a request
    #[error("management API returned {status}: {message}")]
    Management { status: u16, message: String },

    #[error("stanza [{stanza}] already exists in {conf}.conf")]
    StanzaExists { conf: String, stanza: String },

    #[error("service did not report running within {waited:?} after restart")]
    RestartTimeout { waited: Duration },

    #[error("no package file known for uninstall")]
    MissingPackage,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn command_execution(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// True for download/transport failures, which callers never retry.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::HttpStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_class() {
        let err = Error::HttpStatus {
            url: "http://example.com/pkg.tgz".into(),
            status: 404,
        };
        assert!(err.is_network());
        assert!(!Error::MissingPackage.is_network());
    }

    #[test]
    fn test_command_execution_message_carries_output() {
        let err = Error::command_execution("splunk stop", "not running\npermission denied");
        let msg = err.to_string();
        assert!(msg.contains("splunk stop"));
        assert!(msg.contains("permission denied"));
    }
}
