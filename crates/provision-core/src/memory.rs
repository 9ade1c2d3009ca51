//! In-memory `ManagementClient` for tests. Namespaces are matched exactly;
//! there is no inheritance between scopes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use provision_platform::{Error, Result};

use crate::management::{ConfStanza, ManagementClient, StanzaContent};
use crate::namespace::Namespace;

type ConfKey = (Namespace, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSearch {
    pub namespace: Namespace,
    pub name: String,
    pub search: String,
    pub extra: BTreeMap<String, String>,
}

#[derive(Default)]
struct State {
    confs: HashMap<ConfKey, BTreeMap<String, StanzaContent>>,
    restarts: usize,
    users: Vec<(String, Vec<String>)>,
    saved_searches: Vec<SavedSearch>,
}

#[derive(Default)]
pub struct InMemoryConfStore {
    state: Mutex<State>,
}

impl InMemoryConfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a stanza visible, creating its conf file if needed.
    pub fn seed(&self, ns: &Namespace, conf: &str, stanza: &str, content: StanzaContent) {
        let mut state = self.state.lock().unwrap();
        state
            .confs
            .entry((ns.clone(), conf.to_string()))
            .or_default()
            .insert(stanza.to_string(), content);
    }

    pub fn stanza(&self, ns: &Namespace, conf: &str, stanza: &str) -> Option<StanzaContent> {
        let state = self.state.lock().unwrap();
        state
            .confs
            .get(&(ns.clone(), conf.to_string()))
            .and_then(|stanzas| stanzas.get(stanza))
            .cloned()
    }

    pub fn restarts(&self) -> usize {
        self.state.lock().unwrap().restarts
    }

    pub fn users(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().users.clone()
    }

    pub fn saved_searches(&self) -> Vec<SavedSearch> {
        self.state.lock().unwrap().saved_searches.clone()
    }
}

#[async_trait]
impl ManagementClient for InMemoryConfStore {
    async fn conf_exists(&self, ns: &Namespace, conf: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.confs.contains_key(&(ns.clone(), conf.to_string())))
    }

    async fn get_stanza(
        &self,
        ns: &Namespace,
        conf: &str,
        stanza: &str,
    ) -> Result<Option<ConfStanza>> {
        Ok(self.stanza(ns, conf, stanza).map(|content| ConfStanza {
            conf: conf.to_string(),
            name: stanza.to_string(),
            namespace: ns.clone(),
            content,
        }))
    }

    async fn create_stanza(&self, ns: &Namespace, conf: &str, stanza: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let stanzas = state
            .confs
            .entry((ns.clone(), conf.to_string()))
            .or_default();
        if stanzas.contains_key(stanza) {
            return Err(Error::StanzaExists {
                conf: conf.to_string(),
                stanza: stanza.to_string(),
            });
        }
        stanzas.insert(stanza.to_string(), StanzaContent::new());
        Ok(())
    }

    async fn submit_stanza(
        &self,
        ns: &Namespace,
        conf: &str,
        stanza: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let content = state
            .confs
            .get_mut(&(ns.clone(), conf.to_string()))
            .and_then(|stanzas| stanzas.get_mut(stanza))
            .ok_or_else(|| Error::Management {
                status: 404,
                message: format!("stanza [{}] not found in {}.conf", stanza, conf),
            })?;
        for (k, v) in data {
            content.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.state.lock().unwrap().restarts += 1;
        Ok(())
    }

    async fn create_user(&self, name: &str, _password: &str, roles: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .users
            .push((name.to_string(), roles.to_vec()));
        Ok(())
    }

    async fn create_saved_search(
        &self,
        ns: &Namespace,
        name: &str,
        search: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.state.lock().unwrap().saved_searches.push(SavedSearch {
            namespace: ns.clone(),
            name: name.to_string(),
            search: search.to_string(),
            extra: extra.clone(),
        });
        Ok(())
    }
}
