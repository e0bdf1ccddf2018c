//! In-memory directory for backend integration tests.
//!
//! `MemoryDirectory` implements [`SessionFactory`] over a shared entry map.
//! It checks binds against registered credentials, evaluates [`Filter`]s,
//! answers membership changes the way a real server does, records every
//! operation, and counts opened and closed sessions.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use rolegate_connector::error::{ConnectorError, ConnectorResult};
use rolegate_connector::operation::Filter;
use rolegate_connector_ldap::session::{
    DirectoryEntry, DirectorySession, Modification, ModifyOutcome, SearchScope, SessionFactory,
    SessionState,
};

type ErrorFactory = Box<dyn Fn() -> ConnectorError + Send>;

/// Operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Connect,
    Search,
    Add,
    Modify,
    Delete,
}

struct Failure {
    op: Op,
    /// Matched case-insensitively against the DN/base, or for `Modify`
    /// against the modified attribute names.
    target: Option<String>,
    error: ErrorFactory,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    /// Lowercased name -> (spelling, values)
    attrs: BTreeMap<String, (String, Vec<Vec<u8>>)>,
}

impl StoredEntry {
    fn values(&self, name: &str) -> &[Vec<u8>] {
        self.attrs
            .get(&name.to_lowercase())
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    fn to_directory_entry(&self, requested: &[String]) -> DirectoryEntry {
        let all = requested.is_empty() || requested.iter().any(|a| a == "*");
        let none = requested.iter().any(|a| a == "1.1");
        let mut entry = DirectoryEntry::new(self.dn.clone());

        for (lower, (name, values)) in &self.attrs {
            if none || !(all || requested.iter().any(|r| r.to_lowercase() == *lower)) {
                continue;
            }
            let text: Option<Vec<String>> = values
                .iter()
                .map(|v| String::from_utf8(v.clone()).ok())
                .collect();
            match text {
                Some(text) => {
                    entry.attrs.insert(name.clone(), text);
                }
                None => {
                    entry.bin_attrs.insert(name.clone(), values.clone());
                }
            }
        }
        entry
    }
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, StoredEntry>,
    credentials: HashMap<String, String>,
    failures: Vec<Failure>,
    log: Vec<String>,
    opened: usize,
    closed: usize,
}

impl State {
    fn injected(&mut self, op: Op, targets: &[&str]) -> Option<ConnectorError> {
        let failure = self.failures.iter().find(|f| {
            f.op == op
                && match &f.target {
                    None => true,
                    Some(t) => targets.iter().any(|x| x.eq_ignore_ascii_case(t)),
                }
        })?;
        Some((failure.error)())
    }
}

/// Shared in-memory directory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

fn key(dn: &str) -> String {
    dn.to_lowercase()
}

fn parent_of(dn: &str) -> Option<&str> {
    // RDN values in tests never contain escaped commas before the first separator.
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return Some(&dn[i + 1..]),
            _ => escaped = false,
        }
    }
    None
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let dn = key(dn);
    let base = key(base);
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => parent_of(&dn).map(key) == Some(base),
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{base}")),
    }
}

/// Values compare like the caseIgnoreMatch rule.
fn contains_value(values: &[Vec<u8>], value: &[u8]) -> bool {
    values.iter().any(|v| v.eq_ignore_ascii_case(value))
}

fn matches(entry: &StoredEntry, filter: &Filter) -> bool {
    let text = |v: &Vec<u8>| String::from_utf8_lossy(v).to_lowercase();
    match filter {
        Filter::Equals { attribute, value } => entry
            .values(attribute)
            .iter()
            .any(|v| text(v) == value.to_lowercase()),
        Filter::StartsWith { attribute, value } => entry
            .values(attribute)
            .iter()
            .any(|v| text(v).starts_with(&value.to_lowercase())),
        Filter::Present { attribute } => !entry.values(attribute).is_empty(),
        Filter::And { filters } => filters.iter().all(|f| matches(entry, f)),
        Filter::Or { filters } => filters.iter().any(|f| matches(entry, f)),
        Filter::Not { filter } => !matches(entry, filter),
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Insert an entry directly, bypassing sessions.
    pub fn insert(&self, dn: &str, attributes: &[(&str, &[&str])]) {
        let mut attrs = BTreeMap::new();
        for (name, values) in attributes {
            attrs.insert(
                name.to_lowercase(),
                (
                    name.to_string(),
                    values.iter().map(|v| v.as_bytes().to_vec()).collect(),
                ),
            );
        }
        self.lock().entries.insert(
            key(dn),
            StoredEntry {
                dn: dn.to_string(),
                attrs,
            },
        );
    }

    /// Insert an empty container entry.
    pub fn insert_container(&self, dn: &str) {
        self.insert(dn, &[("objectClass", &["top", "container"])]);
    }

    /// Register a bind identity.
    pub fn allow_bind(&self, name: &str, secret: &str) {
        self.lock()
            .credentials
            .insert(name.to_lowercase(), secret.to_string());
    }

    /// Make operations of kind `op` fail. With a target, only operations on
    /// that DN (or, for modify, that attribute) fail.
    pub fn fail(
        &self,
        op: Op,
        target: Option<&str>,
        error: impl Fn() -> ConnectorError + Send + 'static,
    ) {
        self.lock().failures.push(Failure {
            op,
            target: target.map(str::to_string),
            error: Box::new(error),
        });
    }

    pub fn exists(&self, dn: &str) -> bool {
        self.lock().entries.contains_key(&key(dn))
    }

    pub fn values(&self, dn: &str, attribute: &str) -> Vec<Vec<u8>> {
        self.lock()
            .entries
            .get(&key(dn))
            .map(|e| e.values(attribute).to_vec())
            .unwrap_or_default()
    }

    pub fn strings(&self, dn: &str, attribute: &str) -> Vec<String> {
        self.values(dn, attribute)
            .into_iter()
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .collect()
    }

    pub fn has_value(&self, dn: &str, attribute: &str, value: &str) -> bool {
        self.strings(dn, attribute)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value))
    }

    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().closed
    }

    /// Every opened session has been closed.
    pub fn assert_no_open_sessions(&self) {
        let state = self.lock();
        assert_eq!(
            state.opened, state.closed,
            "{} sessions opened but {} closed",
            state.opened, state.closed
        );
    }

    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl SessionFactory for MemoryDirectory {
    async fn connect(&self) -> ConnectorResult<Box<dyn DirectorySession>> {
        let mut state = self.lock();
        if let Some(e) = state.injected(Op::Connect, &[]) {
            return Err(e);
        }
        state.opened += 1;
        state.log.push("connect".to_string());
        Ok(Box::new(MemorySession {
            directory: self.clone(),
            state: SessionState::Unbound,
        }))
    }
}

/// Session over a [`MemoryDirectory`].
pub struct MemorySession {
    directory: MemoryDirectory,
    state: SessionState,
}

#[async_trait]
impl DirectorySession for MemorySession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn bind(&mut self, name: &str, secret: &str) -> ConnectorResult<()> {
        if self.state == SessionState::Closed {
            return Err(ConnectorError::SessionNotBound {
                operation: "bind",
                state: self.state.as_str(),
            });
        }
        let mut dir = self.directory.lock();
        dir.log.push(format!("bind {name}"));
        match dir.credentials.get(&name.to_lowercase()) {
            Some(expected) if expected == secret => {
                self.state = SessionState::Bound;
                Ok(())
            }
            _ => {
                self.state = SessionState::Unbound;
                Err(ConnectorError::AuthenticationFailed)
            }
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[String],
    ) -> ConnectorResult<Vec<DirectoryEntry>> {
        self.state.require_bound("search")?;
        let mut dir = self.directory.lock();
        dir.log.push(format!("search {base}"));
        if let Some(e) = dir.injected(Op::Search, &[base]) {
            return Err(e);
        }
        if !dir.entries.contains_key(&key(base)) {
            return Err(ConnectorError::ObjectNotFound {
                identifier: base.to_string(),
            });
        }
        Ok(dir
            .entries
            .values()
            .filter(|e| in_scope(&e.dn, base, scope) && matches(e, filter))
            .map(|e| e.to_directory_entry(attributes))
            .collect())
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: Vec<(String, Vec<Vec<u8>>)>,
    ) -> ConnectorResult<()> {
        self.state.require_bound("add")?;
        let mut dir = self.directory.lock();
        dir.log.push(format!("add {dn}"));
        if let Some(e) = dir.injected(Op::Add, &[dn]) {
            return Err(e);
        }
        if dir.entries.contains_key(&key(dn)) {
            return Err(ConnectorError::ObjectAlreadyExists {
                identifier: dn.to_string(),
            });
        }
        let parent = parent_of(dn).unwrap_or_default().to_string();
        if !dir.entries.contains_key(&key(&parent)) {
            return Err(ConnectorError::ObjectNotFound { identifier: parent });
        }
        let attrs = attributes
            .into_iter()
            .map(|(name, values)| (name.to_lowercase(), (name, values)))
            .collect();
        dir.entries.insert(
            key(dn),
            StoredEntry {
                dn: dn.to_string(),
                attrs,
            },
        );
        Ok(())
    }

    async fn modify(
        &mut self,
        dn: &str,
        modifications: Vec<Modification>,
    ) -> ConnectorResult<ModifyOutcome> {
        self.state.require_bound("modify")?;
        let mut dir = self.directory.lock();
        let names: Vec<&str> = modifications.iter().map(Modification::attribute).collect();
        dir.log.push(format!("modify {dn} [{}]", names.join(",")));
        if let Some(e) = dir.injected(Op::Modify, &names) {
            return Err(e);
        }
        let entry = dir
            .entries
            .get_mut(&key(dn))
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: dn.to_string(),
            })?;

        // Validate before applying so a refused request changes nothing.
        for modification in &modifications {
            match modification {
                Modification::Add { attribute, values } => {
                    let current = entry.values(attribute);
                    if values.iter().any(|v| contains_value(current, v)) {
                        return Ok(ModifyOutcome::AlreadyPresent);
                    }
                }
                Modification::Delete { attribute, values } => {
                    let current = entry.values(attribute);
                    if current.is_empty() || values.iter().any(|v| !contains_value(current, v)) {
                        return Ok(ModifyOutcome::NotPresent);
                    }
                }
                Modification::Replace { .. } => {}
            }
        }

        for modification in modifications {
            match modification {
                Modification::Add { attribute, values } => {
                    let slot = entry
                        .attrs
                        .entry(attribute.to_lowercase())
                        .or_insert_with(|| (attribute.clone(), Vec::new()));
                    slot.1.extend(values);
                }
                Modification::Delete { attribute, values } => {
                    let lower = attribute.to_lowercase();
                    if let Some(slot) = entry.attrs.get_mut(&lower) {
                        if values.is_empty() {
                            slot.1.clear();
                        } else {
                            slot.1.retain(|v| !contains_value(&values, v));
                        }
                        if slot.1.is_empty() {
                            entry.attrs.remove(&lower);
                        }
                    }
                }
                Modification::Replace { attribute, values } => {
                    let lower = attribute.to_lowercase();
                    if values.is_empty() {
                        entry.attrs.remove(&lower);
                    } else {
                        entry.attrs.insert(lower, (attribute, values));
                    }
                }
            }
        }
        Ok(ModifyOutcome::Applied)
    }

    async fn delete(&mut self, dn: &str) -> ConnectorResult<()> {
        self.state.require_bound("delete")?;
        let mut dir = self.directory.lock();
        dir.log.push(format!("delete {dn}"));
        if let Some(e) = dir.injected(Op::Delete, &[dn]) {
            return Err(e);
        }
        dir.entries
            .remove(&key(dn))
            .map(|_| ())
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: dn.to_string(),
            })
    }

    async fn close(&mut self) -> ConnectorResult<()> {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            let mut dir = self.directory.lock();
            dir.closed += 1;
            dir.log.push("close".to_string());
        }
        Ok(())
    }
}
