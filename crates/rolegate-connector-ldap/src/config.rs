//! LDAP and Active Directory backend configuration

use serde::{Deserialize, Serialize};
use tracing::warn;

use rolegate_connector::config::{
    env_override, parse_directory_uri, BackendConfig, ConnectionSettings, TlsConfig, REDACTED,
};
use rolegate_connector::error::{ConnectorError, ConnectorResult};
use rolegate_connector::types::BackendType;

use crate::dn::{domain_to_base_dn, first_domain_label};

/// Attributes an Active Directory backend cannot work without.
pub const AD_REQUIRED_ATTRIBUTES: &[&str] = &["cn", "unicodePwd"];

/// How group membership is stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum MembershipModel {
    /// The group entry lists its members (`member`, `uniqueMember`, `memberUid`).
    GroupMember {
        #[serde(default = "default_member_attribute")]
        attribute: String,
        #[serde(default)]
        value: MemberValue,
    },
    /// The user entry lists its groups by name.
    UserAttribute { attribute: String },
}

impl Default for MembershipModel {
    fn default() -> Self {
        MembershipModel::GroupMember {
            attribute: default_member_attribute(),
            value: MemberValue::Dn,
        }
    }
}

/// What a group's member attribute holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberValue {
    /// The user's distinguished name (`groupOfNames`).
    #[default]
    Dn,
    /// The user's key attribute value (`posixGroup` / `memberUid`).
    Key,
}

fn default_member_attribute() -> String {
    "member".to_string()
}

/// Configuration for a generic LDAP backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Backend name referenced by roles.
    pub name: String,

    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Server URI (`ldap://host:389` or `ldaps://host:636`).
    pub uri: String,

    /// Service account DN. Empty means anonymous.
    #[serde(default)]
    pub bind_dn: String,

    /// Service account password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Environment variable that overrides `bind_password` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password_env: Option<String>,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Container holding user entries.
    pub user_base: String,

    /// Container holding group entries.
    pub group_base: String,

    /// Attribute holding the logical user key.
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,

    /// Attribute used as the RDN of new user entries.
    #[serde(default = "default_key_attribute")]
    pub dn_user_attribute: String,

    /// Attribute used as the RDN of group entries.
    #[serde(default = "default_group_naming_attribute")]
    pub group_naming_attribute: String,

    /// Object classes written on new user entries.
    #[serde(default = "default_user_object_classes")]
    pub user_object_classes: Vec<String>,

    /// Object class that identifies user entries in searches.
    #[serde(default = "default_user_filter_class")]
    pub user_filter_class: String,

    #[serde(default)]
    pub membership: MembershipModel,

    /// Attributes matched by prefix in user searches (the key is matched exactly).
    #[serde(default = "default_search_attributes")]
    pub search_attributes: Vec<String>,

    /// Attribute that stores the user password.
    #[serde(default = "default_password_attribute")]
    pub password_attribute: String,

    /// Declared user attributes this backend reads and writes.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| REDACTED))
            .field("bind_password_env", &self.bind_password_env)
            .field("tls", &self.tls)
            .field("connection", &self.connection)
            .field("user_base", &self.user_base)
            .field("group_base", &self.group_base)
            .field("key_attribute", &self.key_attribute)
            .field("dn_user_attribute", &self.dn_user_attribute)
            .field("membership", &self.membership)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

fn default_key_attribute() -> String {
    "uid".to_string()
}

fn default_group_naming_attribute() -> String {
    "cn".to_string()
}

fn default_user_object_classes() -> Vec<String> {
    vec![
        "top".to_string(),
        "person".to_string(),
        "organizationalPerson".to_string(),
        "inetOrgPerson".to_string(),
    ]
}

fn default_user_filter_class() -> String {
    "person".to_string()
}

fn default_search_attributes() -> Vec<String> {
    vec![
        "cn".to_string(),
        "sn".to_string(),
        "givenName".to_string(),
        "mail".to_string(),
    ]
}

fn default_password_attribute() -> String {
    "userPassword".to_string()
}

impl LdapConfig {
    /// Create a config with required fields and schema defaults.
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        user_base: impl Into<String>,
        group_base: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            uri: uri.into(),
            bind_dn: String::new(),
            bind_password: None,
            bind_password_env: None,
            tls: TlsConfig::default(),
            connection: ConnectionSettings::default(),
            user_base: user_base.into(),
            group_base: group_base.into(),
            key_attribute: default_key_attribute(),
            dn_user_attribute: default_key_attribute(),
            group_naming_attribute: default_group_naming_attribute(),
            user_object_classes: default_user_object_classes(),
            user_filter_class: default_user_filter_class(),
            membership: MembershipModel::default(),
            search_attributes: default_search_attributes(),
            password_attribute: default_password_attribute(),
            attributes: Vec::new(),
        }
    }

    /// Set the service account.
    pub fn with_bind(mut self, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = bind_dn.into();
        self.bind_password = Some(password.into());
        self
    }

    /// Set the declared attribute list.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the key attribute (and RDN attribute) of user entries.
    pub fn with_key_attribute(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        self.dn_user_attribute = attribute.clone();
        self.key_attribute = attribute;
        self
    }

    #[must_use]
    pub fn with_membership(mut self, membership: MembershipModel) -> Self {
        self.membership = membership;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Password used for the service bind, after the environment override.
    pub fn effective_bind_password(&self) -> String {
        env_override(self.bind_password.as_deref(), self.bind_password_env.as_deref())
            .unwrap_or_default()
    }

    /// Label for logs and UIs.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("LDAP: {}", self.name))
    }

    /// Attributes to request when reading a user.
    pub fn read_attributes(&self) -> Vec<String> {
        let mut wanted = self.attributes.clone();
        for extra in [&self.key_attribute, &self.dn_user_attribute] {
            if !wanted.iter().any(|a| a.eq_ignore_ascii_case(extra)) {
                wanted.push(extra.clone());
            }
        }
        if let MembershipModel::UserAttribute { attribute } = &self.membership {
            if !wanted.iter().any(|a| a.eq_ignore_ascii_case(attribute)) {
                wanted.push(attribute.clone());
            }
        }
        wanted
    }
}

fn require_non_empty(value: &str, field: &str, backend: &str) -> ConnectorResult<()> {
    if value.trim().is_empty() {
        return Err(ConnectorError::InvalidConfiguration {
            message: format!("backend '{backend}': {field} is required"),
        });
    }
    Ok(())
}

impl BackendConfig for LdapConfig {
    fn backend_type() -> BackendType {
        BackendType::Ldap
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ConnectorResult<()> {
        require_non_empty(&self.name, "name", "<unnamed>")?;
        require_non_empty(&self.user_base, "user_base", &self.name)?;
        require_non_empty(&self.group_base, "group_base", &self.name)?;
        require_non_empty(&self.key_attribute, "key_attribute", &self.name)?;
        require_non_empty(&self.dn_user_attribute, "dn_user_attribute", &self.name)?;
        self.connection.validate(&self.name)?;

        let uri = parse_directory_uri(&self.uri)?;
        if uri.scheme() == "ldaps" && self.tls.starttls {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("backend '{}': cannot use both ldaps and STARTTLS", self.name),
            });
        }

        self.tls.validate()?;
        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some(REDACTED.to_string());
        }
        config
    }
}

/// Configuration for an Active Directory backend.
///
/// The directory layout is derived from `domain`: users and groups live under
/// `OU=Users,OU=<first label>,DC=...`, built-in groups under `CN=Builtin,DC=...`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ActiveDirectoryConfig {
    /// Backend name referenced by roles.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Server URI (`ldaps://dc.example.com`).
    pub uri: String,

    /// DNS domain (`example.com`).
    pub domain: String,

    /// Service account login, without the domain.
    #[serde(default)]
    pub login: String,

    /// Environment variable that overrides `login` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Environment variable that overrides `bind_password` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password_env: Option<String>,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Declared user attributes. Must include `cn` and `unicodePwd`.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl std::fmt::Debug for ActiveDirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDirectoryConfig")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("domain", &self.domain)
            .field("login", &self.login)
            .field("login_env", &self.login_env)
            .field("bind_password", &self.bind_password.as_ref().map(|_| REDACTED))
            .field("bind_password_env", &self.bind_password_env)
            .field("tls", &self.tls)
            .field("connection", &self.connection)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl ActiveDirectoryConfig {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            uri: uri.into(),
            domain: domain.into(),
            login: String::new(),
            login_env: None,
            bind_password: None,
            bind_password_env: None,
            tls: TlsConfig::default(),
            connection: ConnectionSettings::default(),
            attributes: Vec::new(),
        }
    }

    /// Set the service account.
    pub fn with_login(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = login.into();
        self.bind_password = Some(password.into());
        self
    }

    /// Set the declared attribute list.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// `DC=` form of the domain.
    pub fn base_dn(&self) -> String {
        domain_to_base_dn(&self.domain)
    }

    /// Container of users and ordinary groups.
    pub fn user_container(&self) -> String {
        format!(
            "OU=Users,OU={},{}",
            first_domain_label(&self.domain),
            self.base_dn()
        )
    }

    /// Container of built-in groups.
    pub fn builtin_container(&self) -> String {
        format!("CN=Builtin,{}", self.base_dn())
    }

    /// Principal name for `login` in this domain.
    pub fn principal_name(&self, login: &str) -> String {
        format!("{login}@{}", self.domain)
    }

    /// Service account login after the environment override.
    pub fn effective_login(&self) -> String {
        env_override(Some(&self.login), self.login_env.as_deref()).unwrap_or_default()
    }

    /// Service account password after the environment override.
    pub fn effective_bind_password(&self) -> String {
        env_override(self.bind_password.as_deref(), self.bind_password_env.as_deref())
            .unwrap_or_default()
    }

    /// Label for logs and UIs.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("Active Directory: {}", self.domain))
    }

    /// Fail with [`ConnectorError::MissingRequiredAttribute`] unless both the
    /// display-name and password attributes are declared.
    pub fn check_required_attributes(&self) -> ConnectorResult<()> {
        for required in AD_REQUIRED_ATTRIBUTES {
            if !self.attributes.iter().any(|a| a.eq_ignore_ascii_case(required)) {
                return Err(ConnectorError::MissingRequiredAttribute {
                    backend: self.name.clone(),
                    attribute: (*required).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Generic LDAP view of this directory, used for shared operations.
    pub fn to_ldap_config(&self) -> LdapConfig {
        let container = self.user_container();
        let bind_login = self.effective_login();

        LdapConfig {
            name: self.name.clone(),
            display_name: Some(self.label()),
            uri: self.uri.clone(),
            bind_dn: self.principal_name(&bind_login),
            bind_password: self.bind_password.clone(),
            bind_password_env: self.bind_password_env.clone(),
            tls: self.tls.clone(),
            connection: self.connection.clone(),
            user_base: container.clone(),
            group_base: container,
            key_attribute: "sAMAccountName".to_string(),
            dn_user_attribute: "cn".to_string(),
            group_naming_attribute: "CN".to_string(),
            user_object_classes: vec![
                "top".to_string(),
                "person".to_string(),
                "organizationalPerson".to_string(),
                "user".to_string(),
            ],
            user_filter_class: "user".to_string(),
            membership: MembershipModel::default(),
            search_attributes: vec![
                "cn".to_string(),
                "name".to_string(),
                "sn".to_string(),
                "givenName".to_string(),
            ],
            password_attribute: "unicodePwd".to_string(),
            attributes: self.attributes.clone(),
        }
    }
}

impl BackendConfig for ActiveDirectoryConfig {
    fn backend_type() -> BackendType {
        BackendType::Ad
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ConnectorResult<()> {
        require_non_empty(&self.name, "name", "<unnamed>")?;
        require_non_empty(&self.domain, "domain", &self.name)?;
        if self.domain.split('.').any(str::is_empty) {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("backend '{}': invalid domain '{}'", self.name, self.domain),
            });
        }

        self.check_required_attributes()?;
        self.connection.validate(&self.name)?;

        let uri = parse_directory_uri(&self.uri)?;
        if uri.scheme() == "ldaps" && self.tls.starttls {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("backend '{}': cannot use both ldaps and STARTTLS", self.name),
            });
        }
        if uri.scheme() == "ldap" && !self.tls.starttls {
            warn!(
                backend = %self.name,
                "Active Directory backend without TLS, password operations will be refused by the server"
            );
        }

        self.tls.validate()?;
        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some(REDACTED.to_string());
        }
        config
    }
}
