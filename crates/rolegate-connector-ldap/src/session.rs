//! Directory sessions
//!
//! A session is one authenticated conversation with a directory server. It
//! moves `Unbound -> Bound -> Closed`; operations other than `bind` and
//! `close` require the `Bound` state. Adapters open a session per logical
//! operation and close it on every exit path with [`close_after`].
//!
//! [`SessionFactory`] is the seam between adapters and the wire: production
//! code uses [`LdapSessionFactory`] (ldap3), tests plug in an in-memory
//! directory.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use rolegate_connector::config::{parse_directory_uri, ConnectionSettings, TlsConfig};
use rolegate_connector::error::{ConnectorError, ConnectorResult};
use rolegate_connector::operation::Filter;

/// LDAP result codes the adapters interpret.
pub mod rc {
    pub const SUCCESS: u32 = 0;
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    pub const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const UNWILLING_TO_PERFORM: u32 = 53;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Lifecycle state of a [`DirectorySession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is open, no successful bind yet.
    Unbound,
    /// Authenticated; directory operations are allowed.
    Bound,
    /// Released. No further operation is possible.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unbound => "unbound",
            SessionState::Bound => "bound",
            SessionState::Closed => "closed",
        }
    }

    /// Fail unless bound.
    pub fn require_bound(self, operation: &'static str) -> ConnectorResult<()> {
        if self == SessionState::Bound {
            Ok(())
        } else {
            Err(ConnectorError::SessionNotBound {
                operation,
                state: self.as_str(),
            })
        }
    }
}

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// An entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    pub dn: String,
    /// Attributes whose values are valid UTF-8.
    pub attrs: BTreeMap<String, Vec<String>>,
    /// Attributes with at least one non-UTF-8 value.
    pub bin_attrs: BTreeMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Default::default()
        }
    }

    /// Textual values of an attribute, matched case-insensitively.
    pub fn values(&self, name: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// First textual value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Binary values of an attribute, matched case-insensitively.
    pub fn binary_values(&self, name: &str) -> &[Vec<u8>] {
        self.bin_attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs.into_iter().collect(),
            bin_attrs: entry.bin_attrs.into_iter().collect(),
        }
    }
}

/// One change within a modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Add { attribute: String, values: Vec<Vec<u8>> },
    Delete { attribute: String, values: Vec<Vec<u8>> },
    Replace { attribute: String, values: Vec<Vec<u8>> },
}

impl Modification {
    pub fn add(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Modification::Add {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn delete(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Modification::Delete {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn replace(attribute: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Modification::Replace {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add { attribute, .. }
            | Modification::Delete { attribute, .. }
            | Modification::Replace { attribute, .. } => attribute,
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, Modification::Delete { .. })
    }

    fn into_mod(self) -> Mod<Vec<u8>> {
        match self {
            Modification::Add { attribute, values } => {
                Mod::Add(attribute.into_bytes(), values.into_iter().collect())
            }
            Modification::Delete { attribute, values } => {
                Mod::Delete(attribute.into_bytes(), values.into_iter().collect())
            }
            Modification::Replace { attribute, values } => {
                Mod::Replace(attribute.into_bytes(), values.into_iter().collect())
            }
        }
    }
}

/// How a modify request that touched values was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// The directory applied every change.
    Applied,
    /// An added value was already present.
    AlreadyPresent,
    /// A deleted value was not present.
    NotPresent,
}

/// An authenticated conversation with a directory server.
#[async_trait]
pub trait DirectorySession: Send {
    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Authenticate. Rejected credentials yield
    /// [`ConnectorError::AuthenticationFailed`] and leave the session unbound.
    async fn bind(&mut self, name: &str, secret: &str) -> ConnectorResult<()>;

    /// Search below `base`. A missing base is [`ConnectorError::ObjectNotFound`].
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[String],
    ) -> ConnectorResult<Vec<DirectoryEntry>>;

    /// Create an entry.
    async fn add(&mut self, dn: &str, attributes: Vec<(String, Vec<Vec<u8>>)>)
        -> ConnectorResult<()>;

    /// Modify an entry.
    async fn modify(
        &mut self,
        dn: &str,
        modifications: Vec<Modification>,
    ) -> ConnectorResult<ModifyOutcome>;

    /// Delete an entry.
    async fn delete(&mut self, dn: &str) -> ConnectorResult<()>;

    /// Release the session. Closing a closed session is a no-op.
    async fn close(&mut self) -> ConnectorResult<()>;
}

/// Opens unbound sessions against one directory server.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self) -> ConnectorResult<Box<dyn DirectorySession>>;
}

/// Connect, then bind. The session is closed again if the bind fails.
pub async fn open_bound(
    factory: &dyn SessionFactory,
    name: &str,
    secret: &str,
) -> ConnectorResult<Box<dyn DirectorySession>> {
    let mut session = factory.connect().await?;
    match session.bind(name, secret).await {
        Ok(()) => Ok(session),
        Err(e) => close_after(session, Err(e)).await,
    }
}

/// Close `session` and hand back `result` unchanged.
///
/// A failure to close is logged; it never masks the operation's outcome.
pub async fn close_after<T>(
    mut session: Box<dyn DirectorySession>,
    result: ConnectorResult<T>,
) -> ConnectorResult<T> {
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close directory session");
    }
    result
}

/// Render a [`Filter`] in RFC 4515 string form.
pub fn filter_to_ldap(filter: &Filter) -> String {
    match filter {
        Filter::And { filters } => {
            let inner: Vec<String> = filters.iter().map(filter_to_ldap).collect();
            format!("(&{})", inner.join(""))
        }
        Filter::Or { filters } => {
            let inner: Vec<String> = filters.iter().map(filter_to_ldap).collect();
            format!("(|{})", inner.join(""))
        }
        Filter::Not { filter } => format!("(!{})", filter_to_ldap(filter)),
        Filter::Equals { attribute, value } => {
            format!("({}={})", attribute, escape_ldap_value(value))
        }
        Filter::StartsWith { attribute, value } => {
            format!("({}={}*)", attribute, escape_ldap_value(value))
        }
        Filter::Present { attribute } => format!("({attribute}=*)"),
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_ldap_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// [`SessionFactory`] speaking LDAPv3 over TCP through ldap3.
pub struct LdapSessionFactory {
    url: String,
    timeout: Duration,
    starttls: bool,
    verify_certificate: bool,
    tls_connector: Option<native_tls::TlsConnector>,
}

impl LdapSessionFactory {
    /// Prepare a factory. Reads the CA file, if any; does not connect.
    pub fn new(
        uri: &str,
        tls: &TlsConfig,
        connection: &ConnectionSettings,
    ) -> ConnectorResult<Self> {
        parse_directory_uri(uri)?;
        tls.validate()?;
        tls.validate_security();

        let tls_connector = match &tls.ca_cert_path {
            Some(path) => Some(Self::build_tls_connector(path, tls.verify_certificate)?),
            None => None,
        };

        Ok(Self {
            url: uri.to_string(),
            timeout: connection.timeout(),
            starttls: tls.starttls,
            verify_certificate: tls.verify_certificate,
            tls_connector,
        })
    }

    fn build_tls_connector(
        ca_path: &str,
        verify_certificate: bool,
    ) -> ConnectorResult<native_tls::TlsConnector> {
        let pem = std::fs::read(ca_path).map_err(|_| ConnectorError::CaFileNotFound {
            path: ca_path.to_string(),
        })?;
        let certificate = native_tls::Certificate::from_pem(&pem).map_err(|e| {
            ConnectorError::InvalidConfiguration {
                message: format!("CA file {ca_path} is not a PEM certificate: {e}"),
            }
        })?;

        let mut builder = native_tls::TlsConnector::builder();
        builder.add_root_certificate(certificate);
        if !verify_certificate {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(|e| ConnectorError::InvalidConfiguration {
            message: format!("failed to build TLS connector: {e}"),
        })
    }

    fn settings(&self) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.starttls)
            .set_no_tls_verify(!self.verify_certificate);
        if let Some(connector) = &self.tls_connector {
            settings = settings.set_connector(connector.clone());
        }
        settings
    }
}

#[async_trait]
impl SessionFactory for LdapSessionFactory {
    async fn connect(&self) -> ConnectorResult<Box<dyn DirectorySession>> {
        debug!(url = %self.url, "Connecting to directory server");

        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), &self.url)
            .await
            .map_err(|e| map_transport_error(&self.url, self.timeout, e))?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Box::new(LdapSession {
            ldap,
            state: SessionState::Unbound,
            timeout: self.timeout,
            url: self.url.clone(),
        }))
    }
}

impl std::fmt::Debug for LdapSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSessionFactory")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("starttls", &self.starttls)
            .field("verify_certificate", &self.verify_certificate)
            .finish()
    }
}

fn map_transport_error(context: &str, timeout: Duration, e: LdapError) -> ConnectorError {
    match e {
        LdapError::Timeout { .. } => ConnectorError::ConnectionTimeout {
            timeout_secs: timeout.as_secs(),
        },
        other => ConnectorError::connection_failed_with_source(
            format!("directory request failed: {context}"),
            other,
        ),
    }
}

fn operation_error(operation: &str, dn: &str, result: &LdapResult) -> ConnectorError {
    ConnectorError::operation_failed(format!(
        "{operation} {dn} failed with code {}: {}",
        result.rc, result.text
    ))
}

/// A live ldap3 session.
pub struct LdapSession {
    ldap: Ldap,
    state: SessionState,
    timeout: Duration,
    url: String,
}

#[async_trait]
impl DirectorySession for LdapSession {
    fn state(&self) -> SessionState {
        self.state
    }

    #[instrument(skip(self, secret))]
    async fn bind(&mut self, name: &str, secret: &str) -> ConnectorResult<()> {
        if self.state == SessionState::Closed {
            return Err(ConnectorError::SessionNotBound {
                operation: "bind",
                state: self.state.as_str(),
            });
        }

        let timeout = self.timeout;
        let result = self
            .ldap
            .with_timeout(timeout)
            .simple_bind(name, secret)
            .await;
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.state = SessionState::Unbound;
                return Err(map_transport_error(&self.url, timeout, e));
            }
        };

        match result.rc {
            rc::SUCCESS => {
                self.state = SessionState::Bound;
                debug!("Directory bind succeeded");
                Ok(())
            }
            rc::INVALID_CREDENTIALS => {
                self.state = SessionState::Unbound;
                Err(ConnectorError::AuthenticationFailed)
            }
            _ => {
                self.state = SessionState::Unbound;
                Err(ConnectorError::connection_failed(format!(
                    "bind as {name} failed with code {}: {}",
                    result.rc, result.text
                )))
            }
        }
    }

    #[instrument(skip(self, filter, attributes))]
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[String],
    ) -> ConnectorResult<Vec<DirectoryEntry>> {
        self.state.require_bound("search")?;

        let filter = filter_to_ldap(filter);
        debug!(filter = %filter, "Searching directory");

        let timeout = self.timeout;
        let ldap3::SearchResult(entries, result) = self
            .ldap
            .with_timeout(timeout)
            .search(base, scope.into(), &filter, attributes.to_vec())
            .await
            .map_err(|e| map_transport_error(&self.url, timeout, e))?;

        match result.rc {
            rc::SUCCESS => {}
            rc::SIZE_LIMIT_EXCEEDED => {
                warn!(base = %base, filter = %filter, "Search hit the server size limit, results truncated");
            }
            rc::NO_SUCH_OBJECT => {
                return Err(ConnectorError::ObjectNotFound {
                    identifier: base.to_string(),
                })
            }
            _ => return Err(operation_error("search under", base, &result)),
        }

        Ok(entries
            .into_iter()
            .filter(|e| !e.is_ref())
            .map(|e| DirectoryEntry::from(SearchEntry::construct(e)))
            .collect())
    }

    #[instrument(skip(self, attributes))]
    async fn add(
        &mut self,
        dn: &str,
        attributes: Vec<(String, Vec<Vec<u8>>)>,
    ) -> ConnectorResult<()> {
        self.state.require_bound("add")?;

        let attributes: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .into_iter()
            .map(|(name, values)| (name.into_bytes(), values.into_iter().collect()))
            .collect();

        let timeout = self.timeout;
        let result = self
            .ldap
            .with_timeout(timeout)
            .add(dn, attributes)
            .await
            .map_err(|e| map_transport_error(&self.url, timeout, e))?;

        match result.rc {
            rc::SUCCESS => Ok(()),
            rc::ENTRY_ALREADY_EXISTS => Err(ConnectorError::ObjectAlreadyExists {
                identifier: dn.to_string(),
            }),
            rc::NO_SUCH_OBJECT => Err(ConnectorError::ObjectNotFound {
                identifier: result.matched.clone(),
            }),
            _ => Err(operation_error("add", dn, &result)),
        }
    }

    #[instrument(skip(self, modifications))]
    async fn modify(
        &mut self,
        dn: &str,
        modifications: Vec<Modification>,
    ) -> ConnectorResult<ModifyOutcome> {
        self.state.require_bound("modify")?;

        let deletes_only = modifications.iter().all(Modification::is_delete);
        let mods: Vec<Mod<Vec<u8>>> = modifications.into_iter().map(Modification::into_mod).collect();

        let timeout = self.timeout;
        let result = self
            .ldap
            .with_timeout(timeout)
            .modify(dn, mods)
            .await
            .map_err(|e| map_transport_error(&self.url, timeout, e))?;

        match result.rc {
            rc::SUCCESS => Ok(ModifyOutcome::Applied),
            // Active Directory answers entryAlreadyExists for a duplicate member value.
            rc::ATTRIBUTE_OR_VALUE_EXISTS | rc::ENTRY_ALREADY_EXISTS => {
                Ok(ModifyOutcome::AlreadyPresent)
            }
            rc::NO_SUCH_ATTRIBUTE => Ok(ModifyOutcome::NotPresent),
            // ...and unwillingToPerform when removing a value that is not there.
            rc::UNWILLING_TO_PERFORM if deletes_only => Ok(ModifyOutcome::NotPresent),
            rc::NO_SUCH_OBJECT => Err(ConnectorError::ObjectNotFound {
                identifier: dn.to_string(),
            }),
            _ => Err(operation_error("modify", dn, &result)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&mut self, dn: &str) -> ConnectorResult<()> {
        self.state.require_bound("delete")?;

        let timeout = self.timeout;
        let result = self
            .ldap
            .with_timeout(timeout)
            .delete(dn)
            .await
            .map_err(|e| map_transport_error(&self.url, timeout, e))?;

        match result.rc {
            rc::SUCCESS => Ok(()),
            rc::NO_SUCH_OBJECT => Err(ConnectorError::ObjectNotFound {
                identifier: dn.to_string(),
            }),
            _ => Err(operation_error("delete", dn, &result)),
        }
    }

    async fn close(&mut self) -> ConnectorResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        let timeout = self.timeout;
        self.ldap.unbind().await.map_err(|e| map_transport_error(&self.url, timeout, e))
    }
}

impl Drop for LdapSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!(url = %self.url, state = self.state.as_str(), "Directory session dropped without close");
        }
    }
}
