//! Namespace model of the management API: configuration is partitioned by
//! owner, app and sharing scope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use provision_platform::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sharing {
    #[default]
    User,
    App,
    Global,
    System,
}

impl fmt::Display for Sharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::App => "app",
            Self::Global => "global",
            Self::System => "system",
        })
    }
}

impl FromStr for Sharing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "app" => Ok(Self::App),
            "global" => Ok(Self::Global),
            "system" => Ok(Self::System),
            other => Err(Error::InvalidArgument(format!("unknown sharing mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Namespace {
    pub owner: Option<String>,
    pub app: Option<String>,
    pub sharing: Sharing,
}

impl Namespace {
    pub fn new(owner: impl Into<String>, app: impl Into<String>, sharing: Sharing) -> Self {
        Self {
            owner: Some(owner.into()),
            app: Some(app.into()),
            sharing,
        }
    }

    /// System-wide scope, where server.conf settings live
    pub fn system() -> Self {
        Self {
            owner: None,
            app: None,
            sharing: Sharing::System,
        }
    }

    /// URL path segments selecting this namespace.
    ///
    /// `app`/`global` sharing pins the owner to `nobody`, `system` pins both
    /// owner and app, and unset values become the `-` wildcard.
    pub fn path_segments(&self) -> Vec<String> {
        let wildcard = || "-".to_string();
        match self.sharing {
            Sharing::System => vec!["servicesNS".into(), "nobody".into(), "system".into()],
            Sharing::App | Sharing::Global => vec![
                "servicesNS".into(),
                "nobody".into(),
                self.app.clone().unwrap_or_else(wildcard),
            ],
            Sharing::User if self.owner.is_none() && self.app.is_none() => {
                vec!["services".into()]
            }
            Sharing::User => vec![
                "servicesNS".into(),
                self.owner.clone().unwrap_or_else(wildcard),
                self.app.clone().unwrap_or_else(wildcard),
            ],
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.owner.as_deref().unwrap_or("-"),
            self.app.as_deref().unwrap_or("-"),
            self.sharing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments() {
        let user = Namespace::new("admin", "search", Sharing::User);
        assert_eq!(user.path_segments(), ["servicesNS", "admin", "search"]);

        let app = Namespace::new("admin", "search", Sharing::App);
        assert_eq!(app.path_segments(), ["servicesNS", "nobody", "search"]);

        let global = Namespace {
            owner: None,
            app: None,
            sharing: Sharing::Global,
        };
        assert_eq!(global.path_segments(), ["servicesNS", "nobody", "-"]);

        assert_eq!(
            Namespace::system().path_segments(),
            ["servicesNS", "nobody", "system"]
        );
        assert_eq!(Namespace::default().path_segments(), ["services"]);
    }

    #[test]
    fn test_sharing_parse() {
        assert_eq!("APP".parse::<Sharing>().unwrap(), Sharing::App);
        assert!("team".parse::<Sharing>().is_err());
    }
}
