//! Management API client: namespace-scoped conf stanzas, users, saved
//! searches and restart over the product's REST interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use provision_platform::{Error, Result};

use crate::namespace::Namespace;

/// Key/value content of one stanza as the management API reports it
pub type StanzaContent = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// `https` or `http`
    pub scheme: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "changeme".to_string(),
            scheme: "https".to_string(),
        }
    }
}

impl Credentials {
    /// Value for the CLI's `-auth` flag
    pub fn cli_auth(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

/// A stanza read back from a conf file. Identity is (conf, name, namespace).
#[derive(Debug, Clone, PartialEq)]
pub struct ConfStanza {
    pub conf: String,
    pub name: String,
    pub namespace: Namespace,
    pub content: StanzaContent,
}

impl ConfStanza {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.content.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Whether `<conf>.conf` is visible in the namespace
    async fn conf_exists(&self, ns: &Namespace, conf: &str) -> Result<bool>;

    /// Fetch a stanza, `None` if it does not exist
    async fn get_stanza(&self, ns: &Namespace, conf: &str, stanza: &str)
        -> Result<Option<ConfStanza>>;

    /// Create an empty stanza; `Error::StanzaExists` if it is already there
    async fn create_stanza(&self, ns: &Namespace, conf: &str, stanza: &str) -> Result<()>;

    /// Post key/value pairs to an existing stanza. Merging is up to the server.
    async fn submit_stanza(
        &self,
        ns: &Namespace,
        conf: &str,
        stanza: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    async fn create_user(&self, name: &str, password: &str, roles: &[String]) -> Result<()>;

    async fn create_saved_search(
        &self,
        ns: &Namespace,
        name: &str,
        search: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<()>;
}

#[derive(Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Vec<FeedEntry>,
}

#[derive(Deserialize)]
struct FeedEntry {
    name: String,
    #[serde(default)]
    content: StanzaContent,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    messages: Vec<ErrorMessage>,
}

#[derive(Deserialize)]
struct ErrorMessage {
    text: String,
}

/// `ManagementClient` over HTTP with basic auth and JSON output.
pub struct RestClient {
    base_url: Url,
    credentials: Credentials,
    http: reqwest::Client,
}

impl RestClient {
    /// `base_url` is the management endpoint, e.g. `https://localhost:8089`.
    /// Self-signed certificates are accepted unless `verify_tls` is set.
    pub fn new(base_url: &str, credentials: Credentials, verify_tls: bool) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            Error::InvalidArgument(format!("invalid management URL {}: {}", base_url, e))
        })?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| Error::Network {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            credentials,
            http,
        })
    }

    fn endpoint(&self, prefix: &[String], tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::InvalidArgument(format!("cannot use {} as a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(prefix)
            .extend(tail);
        url.query_pairs_mut().append_pair("output_mode", "json");
        Ok(url)
    }

    fn ns_endpoint(&self, ns: &Namespace, tail: &[&str]) -> Result<Url> {
        self.endpoint(&ns.path_segments(), tail)
    }

    fn services_endpoint(&self, tail: &[&str]) -> Result<Url> {
        self.endpoint(&["services".to_string()], tail)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        self.http
            .get(url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| network(&url, e))
    }

    async fn post<T: Serialize + ?Sized>(&self, url: Url, form: &T) -> Result<reqwest::Response> {
        debug!("POST {}", url);
        self.http
            .post(url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .form(form)
            .send()
            .await
            .map_err(|e| network(&url, e))
    }
}

#[async_trait]
impl ManagementClient for RestClient {
    async fn conf_exists(&self, ns: &Namespace, conf: &str) -> Result<bool> {
        let resp = self.get(self.ns_endpoint(ns, &["properties", conf])?).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        expect_success(resp).await?;
        Ok(true)
    }

    async fn get_stanza(
        &self,
        ns: &Namespace,
        conf: &str,
        stanza: &str,
    ) -> Result<Option<ConfStanza>> {
        let conf_path = format!("conf-{}", conf);
        let url = self.ns_endpoint(ns, &["configs", &conf_path, stanza])?;
        let resp = self.get(url.clone()).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let feed: Feed = expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| network(&url, e))?;

        // Only an entry carrying the requested name counts
        let entry = feed.entry.into_iter().find(|e| e.name == stanza);
        Ok(entry.map(|e| ConfStanza {
            conf: conf.to_string(),
            name: e.name,
            namespace: ns.clone(),
            content: e.content,
        }))
    }

    async fn create_stanza(&self, ns: &Namespace, conf: &str, stanza: &str) -> Result<()> {
        let conf_path = format!("conf-{}", conf);
        let url = self.ns_endpoint(ns, &["configs", &conf_path])?;
        let resp = self.post(url, &[("name", stanza)]).await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(Error::StanzaExists {
                conf: conf.to_string(),
                stanza: stanza.to_string(),
            });
        }
        expect_success(resp).await?;
        Ok(())
    }

    async fn submit_stanza(
        &self,
        ns: &Namespace,
        conf: &str,
        stanza: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let conf_path = format!("conf-{}", conf);
        let url = self.ns_endpoint(ns, &["configs", &conf_path, stanza])?;
        expect_success(self.post(url, data).await?).await?;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let url = self.services_endpoint(&["server", "control", "restart"])?;
        expect_success(self.post(url, &[] as &[(&str, &str)]).await?).await?;
        Ok(())
    }

    async fn create_user(&self, name: &str, password: &str, roles: &[String]) -> Result<()> {
        let url = self.services_endpoint(&["authentication", "users"])?;
        let mut form = vec![("name", name), ("password", password)];
        form.extend(roles.iter().map(|r| ("roles", r.as_str())));
        expect_success(self.post(url, &form).await?).await?;
        Ok(())
    }

    async fn create_saved_search(
        &self,
        ns: &Namespace,
        name: &str,
        search: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<()> {
        let url = self.ns_endpoint(ns, &["saved", "searches"])?;
        let mut form = vec![("name", name), ("search", search)];
        form.extend(extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        expect_success(self.post(url, &form).await?).await?;
        Ok(())
    }
}

async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) if !parsed.messages.is_empty() => parsed
            .messages
            .into_iter()
            .map(|m| m.text)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body,
    };
    Err(Error::Management {
        status: status.as_u16(),
        message,
    })
}

fn network(url: &Url, err: reqwest::Error) -> Error {
    Error::Network {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Sharing;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // base64("admin:changeme")
    const BASIC_AUTH: &str = "Basic YWRtaW46Y2hhbmdlbWU=";

    async fn client(server: &MockServer) -> RestClient {
        RestClient::new(&server.uri(), Credentials::default(), false).unwrap()
    }

    #[tokio::test]
    async fn test_get_stanza() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/servicesNS/nobody/search/configs/conf-savedsearches/Errors%20in%20the%20last%20hour",
            ))
            .and(query_param("output_mode", "json"))
            .and(header("authorization", BASIC_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entry": [{
                    "name": "Errors in the last hour",
                    "content": {"search": "error OR failed", "disabled": false}
                }]
            })))
            .mount(&server)
            .await;

        let ns = Namespace::new("admin", "search", Sharing::App);
        let stanza = client(&server)
            .await
            .get_stanza(&ns, "savedsearches", "Errors in the last hour")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stanza.name, "Errors in the last hour");
        assert_eq!(stanza.get_str("search"), Some("error OR failed"));
        assert_eq!(stanza.get("disabled"), Some(&serde_json::Value::Bool(false)));
        assert_eq!(stanza.namespace, ns);
    }

    #[tokio::test]
    async fn test_entry_with_other_name_is_not_the_stanza() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servicesNS/nobody/system/configs/conf-server/clustering"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entry": [{"name": "general", "content": {"site": "site1"}}]
            })))
            .mount(&server)
            .await;

        let stanza = client(&server)
            .await
            .get_stanza(&Namespace::system(), "server", "clustering")
            .await
            .unwrap();
        assert!(stanza.is_none());
    }

    #[tokio::test]
    async fn test_missing_stanza_and_conf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let ns = Namespace::system();
        assert!(client.get_stanza(&ns, "server", "nope").await.unwrap().is_none());
        assert!(!client.conf_exists(&ns, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_conf_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servicesNS/nobody/system/properties/server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"entry": []})))
            .mount(&server)
            .await;

        assert!(client(&server)
            .await
            .conf_exists(&Namespace::system(), "server")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_create_conflict_is_stanza_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servicesNS/nobody/system/configs/conf-server"))
            .and(body_string_contains("name=clustering"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .create_stanza(&Namespace::system(), "server", "clustering")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StanzaExists { .. }));
    }

    #[tokio::test]
    async fn test_submit_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servicesNS/nobody/system/configs/conf-server/clustering"))
            .and(body_string_contains("pass4SymmKey=s3cret"))
            .and(body_string_contains("mode=master"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"entry": []})))
            .expect(1)
            .mount(&server)
            .await;

        let data = BTreeMap::from([
            ("mode".to_string(), "master".to_string()),
            ("pass4SymmKey".to_string(), "s3cret".to_string()),
        ]);
        let client = client(&server).await;
        client
            .submit_stanza(&Namespace::system(), "server", "clustering", &data)
            .await
            .unwrap();
        // empty submissions never reach the server
        client
            .submit_stanza(&Namespace::system(), "server", "clustering", &BTreeMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_messages_are_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "messages": [{"type": "ERROR", "text": "Argument \"bogus\" is not supported"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.restart().await.unwrap_err();
        match err {
            Error::Management { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Argument \"bogus\" is not supported");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_user_sends_each_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/authentication/users"))
            .and(body_string_contains("name=user0"))
            .and(body_string_contains("roles=user"))
            .and(body_string_contains("roles=power"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .create_user("user0", "user0", &["user".to_string(), "power".to_string()])
            .await
            .unwrap();
    }
}
