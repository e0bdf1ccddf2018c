//! Generic LDAP backend
//!
//! Implements the capability traits against a standards-compliant LDAPv3
//! directory whose layout (containers, key attribute, membership model) comes
//! from [`LdapConfig`]. Every operation opens its own service session and
//! closes it before returning.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use rolegate_connector::config::BackendConfig;
use rolegate_connector::error::{ConnectorError, ConnectorResult};
use rolegate_connector::identity::Identity;
use rolegate_connector::operation::{AttributeSet, AttributeValue, Filter};
use rolegate_connector::traits::{AuthenticateOp, Backend, GroupOp, SearchOp, UserOp};
use rolegate_connector::types::BackendType;

use crate::codec::{decode_entry, AttributeCodec, GenericCodec};
use crate::config::{LdapConfig, MemberValue, MembershipModel};
use crate::dn::child_dn;
use crate::session::{
    close_after, open_bound, DirectoryEntry, DirectorySession, LdapSessionFactory, Modification,
    ModifyOutcome, SearchScope, SessionFactory,
};

/// Attribute selector that asks the server for no attributes (RFC 4511).
pub const NO_ATTRIBUTES: &str = "1.1";

/// Generic LDAP backend.
pub struct LdapConnector {
    config: LdapConfig,
    display_name: String,
    sessions: Arc<dyn SessionFactory>,
    codec: Arc<dyn AttributeCodec>,
}

impl LdapConnector {
    /// Create a backend talking to the configured server.
    ///
    /// Validates the configuration (including the CA file) without connecting.
    pub fn new(config: LdapConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let sessions = LdapSessionFactory::new(&config.uri, &config.tls, &config.connection)?;
        Ok(Self::assemble(config, Arc::new(sessions)))
    }

    /// Create a backend that opens sessions through `sessions`.
    pub fn with_session_factory(
        config: LdapConfig,
        sessions: Arc<dyn SessionFactory>,
    ) -> ConnectorResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, sessions))
    }

    fn assemble(config: LdapConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            display_name: config.label(),
            config,
            sessions,
            codec: Arc::new(GenericCodec),
        }
    }

    /// Replace the attribute codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn AttributeCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Open a session bound as the service account.
    pub(crate) async fn service_session(&self) -> ConnectorResult<Box<dyn DirectorySession>> {
        open_bound(
            self.sessions.as_ref(),
            &self.config.bind_dn,
            &self.config.effective_bind_password(),
        )
        .await
    }

    /// Bind as `bind_name` on a fresh session. Rejected credentials are `Ok(false)`.
    pub(crate) async fn check_credentials(
        &self,
        bind_name: &str,
        secret: &str,
    ) -> ConnectorResult<bool> {
        // An empty password would turn into an unauthenticated bind.
        if secret.is_empty() {
            debug!(backend = %self.config.name, "Refusing empty password");
            return Ok(false);
        }

        match open_bound(self.sessions.as_ref(), bind_name, secret).await {
            Ok(session) => close_after(session, Ok(true)).await,
            Err(ConnectorError::AuthenticationFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Filter matching exactly the user with this key.
    pub fn user_filter(&self, key: &str) -> Filter {
        Filter::and(vec![
            Filter::eq("objectClass", &self.config.user_filter_class),
            Filter::eq(&self.config.key_attribute, key),
        ])
    }

    /// Filter used by `search_users`.
    pub fn search_filter(&self, query: &str) -> Filter {
        let mut alternatives = vec![Filter::eq(&self.config.key_attribute, query)];
        alternatives.extend(
            self.config
                .search_attributes
                .iter()
                .map(|attribute| Filter::starts_with(attribute, query)),
        );
        Filter::and(vec![
            Filter::eq("objectClass", &self.config.user_filter_class),
            Filter::or(alternatives),
        ])
    }

    /// DN of an ordinary group.
    pub fn group_dn(&self, group: &str) -> String {
        child_dn(&self.config.group_naming_attribute, group, &self.config.group_base)
    }

    /// Look up the single entry for `key`.
    pub(crate) async fn find_user(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
        attributes: &[String],
    ) -> ConnectorResult<DirectoryEntry> {
        let mut entries = session
            .search(
                &self.config.user_base,
                SearchScope::Subtree,
                &self.user_filter(key),
                attributes,
            )
            .await?;

        match entries.len() {
            0 => Err(ConnectorError::UserNotFound {
                key: key.to_string(),
            }),
            1 => Ok(entries.remove(0)),
            n => Err(ConnectorError::InvalidData {
                message: format!(
                    "{n} entries under {} match user key '{key}'",
                    self.config.user_base
                ),
            }),
        }
    }

    pub(crate) async fn find_user_dn(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
    ) -> ConnectorResult<DirectoryEntry> {
        self.find_user(session, key, &[NO_ATTRIBUTES.to_string()]).await
    }

    pub(crate) fn to_identity(&self, entry: &DirectoryEntry) -> Identity {
        let key = entry
            .first(&self.config.key_attribute)
            .map(str::to_string)
            .unwrap_or_default();
        let attributes = decode_entry(
            entry,
            &self.config.attributes,
            &[self.config.password_attribute.as_str()],
        );
        Identity::new(key, entry.dn.clone(), attributes)
    }

    fn encode(&self, attribute: &str, value: &AttributeValue) -> ConnectorResult<Vec<Vec<u8>>> {
        self.codec.encode(attribute, value)
    }

    /// Add a user entry built from `attributes`. Returns the identity without
    /// the password attribute.
    pub(crate) async fn create_entry(
        &self,
        session: &mut dyn DirectorySession,
        attributes: &AttributeSet,
    ) -> ConnectorResult<Identity> {
        let key = attributes
            .get_string(&self.config.key_attribute)
            .ok_or_else(|| ConnectorError::InvalidData {
                message: format!(
                    "key attribute '{}' is required to create a user",
                    self.config.key_attribute
                ),
            })?
            .to_string();

        let rdn_value = attributes
            .get(&self.config.dn_user_attribute)
            .and_then(|v| v.as_strings().first().map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConnectorError::InvalidData {
                message: format!(
                    "naming attribute '{}' is required to create a user",
                    self.config.dn_user_attribute
                ),
            })?;

        let dn = child_dn(&self.config.dn_user_attribute, &rdn_value, &self.config.user_base);

        let mut entry: Vec<(String, Vec<Vec<u8>>)> = vec![(
            "objectClass".to_string(),
            self.config
                .user_object_classes
                .iter()
                .map(|c| c.as_bytes().to_vec())
                .collect(),
        )];
        for (name, value) in attributes.iter() {
            if name.eq_ignore_ascii_case("objectClass") {
                continue;
            }
            let values = self.encode(name, value)?;
            if !values.is_empty() {
                entry.push((name.clone(), values));
            }
        }

        debug!(backend = %self.config.name, dn = %dn, "Creating user entry");
        session.add(&dn, entry).await?;
        info!(backend = %self.config.name, dn = %dn, key = %key, "User entry created");

        let mut returned = attributes.clone();
        returned.remove(&self.config.password_attribute);
        Ok(Identity::new(key, dn, returned))
    }

    /// Replace each attribute of the entry at `dn`.
    pub(crate) async fn replace_attributes(
        &self,
        session: &mut dyn DirectorySession,
        dn: &str,
        attributes: &AttributeSet,
    ) -> ConnectorResult<()> {
        if attributes.is_empty() {
            return Ok(());
        }

        let modifications = attributes
            .iter()
            .map(|(name, value)| Ok(Modification::replace(name.clone(), self.encode(name, value)?)))
            .collect::<ConnectorResult<Vec<_>>>()?;

        session.modify(dn, modifications).await?;
        Ok(())
    }

    /// Membership change for `user` in the group named `group` stored at `group_dn`.
    fn membership_change(
        &self,
        user: &DirectoryEntry,
        key: &str,
        group: &str,
        group_dn: &str,
        add: bool,
    ) -> (String, Modification) {
        let (target, attribute, value) = match &self.config.membership {
            MembershipModel::GroupMember { attribute, value } => {
                let member = match value {
                    MemberValue::Dn => user.dn.clone(),
                    MemberValue::Key => key.to_string(),
                };
                (group_dn.to_string(), attribute.clone(), member)
            }
            MembershipModel::UserAttribute { attribute } => {
                (user.dn.clone(), attribute.clone(), group.to_string())
            }
        };
        let modification = if add {
            Modification::add(attribute, value)
        } else {
            Modification::delete(attribute, value)
        };
        (target, modification)
    }

    /// Make `user` a member of `group`. Existing membership is not an error.
    pub(crate) async fn add_membership(
        &self,
        session: &mut dyn DirectorySession,
        user: &DirectoryEntry,
        key: &str,
        group: &str,
        group_dn: &str,
    ) -> ConnectorResult<()> {
        let (target, modification) = self.membership_change(user, key, group, group_dn, true);

        match session.modify(&target, vec![modification]).await {
            Ok(ModifyOutcome::Applied) => {
                info!(backend = %self.config.name, key = %key, group = %group, "Added user to group");
                Ok(())
            }
            Ok(_) => {
                debug!(backend = %self.config.name, key = %key, group = %group, "User already in group");
                Ok(())
            }
            Err(ConnectorError::ObjectNotFound { .. }) if target == group_dn => {
                Err(ConnectorError::GroupNotFound {
                    group: group.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Remove `user` from `group`. Missing membership is not an error.
    pub(crate) async fn remove_membership(
        &self,
        session: &mut dyn DirectorySession,
        user: &DirectoryEntry,
        key: &str,
        group: &str,
        group_dn: &str,
    ) -> ConnectorResult<()> {
        let (target, modification) = self.membership_change(user, key, group, group_dn, false);

        match session.modify(&target, vec![modification]).await {
            Ok(ModifyOutcome::Applied) => {
                info!(backend = %self.config.name, key = %key, group = %group, "Removed user from group");
                Ok(())
            }
            Ok(_) => {
                debug!(backend = %self.config.name, key = %key, group = %group, "User was not in group");
                Ok(())
            }
            Err(ConnectorError::ObjectNotFound { .. }) if target == group_dn => {
                Err(ConnectorError::GroupNotFound {
                    group: group.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Filter selecting the group entries that list `user` as a member.
    pub(crate) fn membership_filter(&self, user: &DirectoryEntry, key: &str) -> Option<Filter> {
        match &self.config.membership {
            MembershipModel::GroupMember { attribute, value } => {
                let member = match value {
                    MemberValue::Dn => user.dn.as_str(),
                    MemberValue::Key => key,
                };
                Some(Filter::eq(attribute, member))
            }
            MembershipModel::UserAttribute { .. } => None,
        }
    }

    /// Names of the groups under `base` matching `filter`.
    pub(crate) async fn group_names_under(
        &self,
        session: &mut dyn DirectorySession,
        base: &str,
        filter: &Filter,
    ) -> ConnectorResult<Vec<String>> {
        let naming = &self.config.group_naming_attribute;
        let entries = session
            .search(base, SearchScope::Subtree, filter, &[naming.clone()])
            .await?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.first(naming).map(str::to_string))
            .collect())
    }

    async fn read_user(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
    ) -> ConnectorResult<Identity> {
        let entry = self.find_user(session, key, &self.config.read_attributes()).await?;
        Ok(self.to_identity(&entry))
    }

    async fn update_user(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
        attributes: &AttributeSet,
    ) -> ConnectorResult<()> {
        let user = self.find_user_dn(session, key).await?;
        self.replace_attributes(session, &user.dn, attributes).await?;
        info!(backend = %self.config.name, key = %key, count = attributes.len(), "Updated user attributes");
        Ok(())
    }

    async fn remove_user(&self, session: &mut dyn DirectorySession, key: &str) -> ConnectorResult<()> {
        let user = self.find_user_dn(session, key).await?;
        session.delete(&user.dn).await?;
        info!(backend = %self.config.name, key = %key, dn = %user.dn, "User entry deleted");
        Ok(())
    }

    async fn change_memberships(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
        groups: &[String],
        add: bool,
    ) -> ConnectorResult<()> {
        let user = self.find_user_dn(session, key).await?;
        for group in groups {
            let group_dn = self.group_dn(group);
            if add {
                self.add_membership(session, &user, key, group, &group_dn).await?;
            } else {
                self.remove_membership(session, &user, key, group, &group_dn).await?;
            }
        }
        Ok(())
    }

    async fn collect_groups(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
    ) -> ConnectorResult<Vec<String>> {
        let names = match &self.config.membership {
            MembershipModel::UserAttribute { attribute } => {
                let user = self.find_user(session, key, &[attribute.clone()]).await?;
                user.values(attribute).to_vec()
            }
            MembershipModel::GroupMember { .. } => {
                let user = self.find_user_dn(session, key).await?;
                match self.membership_filter(&user, key) {
                    Some(filter) => {
                        self.group_names_under(session, &self.config.group_base, &filter)
                            .await?
                    }
                    None => Vec::new(),
                }
            }
        };
        Ok(dedup_names(names))
    }

    pub(crate) async fn search_entries(
        &self,
        session: &mut dyn DirectorySession,
        filter: &Filter,
    ) -> ConnectorResult<Vec<Identity>> {
        let entries = session
            .search(
                &self.config.user_base,
                SearchScope::Subtree,
                filter,
                &self.config.read_attributes(),
            )
            .await?;
        Ok(entries.iter().map(|entry| self.to_identity(entry)).collect())
    }
}

/// Drop repeated names (case-insensitive), keeping first occurrences in order.
pub(crate) fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.iter().any(|u| u.eq_ignore_ascii_case(&name)) {
            unique.push(name);
        }
    }
    unique
}

#[async_trait]
impl Backend for LdapConnector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Ldap
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        let mut session = self.service_session().await?;
        let result = session
            .search(
                &self.config.user_base,
                SearchScope::Base,
                &Filter::present("objectClass"),
                &[NO_ATTRIBUTES.to_string()],
            )
            .await
            .map(|_| ());
        let result = close_after(session, result).await;
        if result.is_ok() {
            info!(backend = %self.config.name, "Directory connection test successful");
        }
        result
    }
}

#[async_trait]
impl AuthenticateOp for LdapConnector {
    #[instrument(skip(self, secret))]
    async fn authenticate(&self, key: &str, secret: &str) -> ConnectorResult<bool> {
        if secret.is_empty() {
            return Ok(false);
        }

        let mut session = self.service_session().await?;
        let lookup = self.find_user_dn(session.as_mut(), key).await;
        let user = match close_after(session, lookup).await {
            Ok(user) => user,
            Err(ConnectorError::UserNotFound { .. }) => {
                debug!(backend = %self.config.name, key = %key, "Authentication for unknown user");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.check_credentials(&user.dn, secret).await
    }
}

#[async_trait]
impl UserOp for LdapConnector {
    #[instrument(skip(self, attributes))]
    async fn create_user(&self, attributes: AttributeSet) -> ConnectorResult<Identity> {
        let mut session = self.service_session().await?;
        let result = self.create_entry(session.as_mut(), &attributes).await;
        close_after(session, result).await
    }

    #[instrument(skip(self))]
    async fn get_user(&self, key: &str) -> ConnectorResult<Identity> {
        let mut session = self.service_session().await?;
        let result = self.read_user(session.as_mut(), key).await;
        close_after(session, result).await
    }

    #[instrument(skip(self, attributes))]
    async fn set_attributes(&self, key: &str, attributes: AttributeSet) -> ConnectorResult<()> {
        let mut session = self.service_session().await?;
        let result = self.update_user(session.as_mut(), key, &attributes).await;
        close_after(session, result).await
    }

    #[instrument(skip(self, secret))]
    async fn set_password(&self, key: &str, secret: &str) -> ConnectorResult<()> {
        // An empty replace would delete the stored password.
        if secret.is_empty() {
            return Err(ConnectorError::InvalidData {
                message: format!("empty password for '{key}' on backend '{}'", self.config.name),
            });
        }
        let attributes =
            AttributeSet::new().with(self.config.password_attribute.clone(), secret);
        let mut session = self.service_session().await?;
        let result = self.update_user(session.as_mut(), key, &attributes).await;
        close_after(session, result).await
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, key: &str) -> ConnectorResult<()> {
        let mut session = self.service_session().await?;
        let result = self.remove_user(session.as_mut(), key).await;
        close_after(session, result).await
    }
}

#[async_trait]
impl GroupOp for LdapConnector {
    #[instrument(skip(self))]
    async fn add_to_groups(&self, key: &str, groups: &[String]) -> ConnectorResult<()> {
        let mut session = self.service_session().await?;
        let result = self.change_memberships(session.as_mut(), key, groups, true).await;
        close_after(session, result).await
    }

    #[instrument(skip(self))]
    async fn remove_from_groups(&self, key: &str, groups: &[String]) -> ConnectorResult<()> {
        let mut session = self.service_session().await?;
        let result = self.change_memberships(session.as_mut(), key, groups, false).await;
        close_after(session, result).await
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, key: &str) -> ConnectorResult<Vec<String>> {
        let mut session = self.service_session().await?;
        let result = self.collect_groups(session.as_mut(), key).await;
        close_after(session, result).await
    }
}

#[async_trait]
impl SearchOp for LdapConnector {
    #[instrument(skip(self))]
    async fn search_users(&self, query: &str) -> ConnectorResult<Vec<Identity>> {
        let filter = self.search_filter(query);
        let mut session = self.service_session().await?;
        let result = self.search_entries(session.as_mut(), &filter).await;
        close_after(session, result).await
    }
}

impl std::fmt::Debug for LdapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnector")
            .field("display_name", &self.display_name)
            .field("config", &self.config.redacted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::filter_to_ldap;

    fn test_connector() -> LdapConnector {
        let config = LdapConfig::new(
            "ldap",
            "ldap://ldap.example.com",
            "ou=People,dc=example,dc=com",
            "ou=Groups,dc=example,dc=com",
        )
        .with_attributes(["uid", "cn", "sn", "mail", "userPassword"]);
        LdapConnector::new(config).unwrap()
    }

    #[test]
    fn test_user_filter() {
        let connector = test_connector();
        assert_eq!(
            filter_to_ldap(&connector.user_filter("jdoe")),
            "(&(objectClass=person)(uid=jdoe))"
        );
        assert_eq!(
            filter_to_ldap(&connector.user_filter("*")),
            "(&(objectClass=person)(uid=\\2a))"
        );
    }

    #[test]
    fn test_search_filter() {
        let connector = test_connector();
        assert_eq!(
            filter_to_ldap(&connector.search_filter("jo")),
            "(&(objectClass=person)(|(uid=jo)(cn=jo*)(sn=jo*)(givenName=jo*)(mail=jo*)))"
        );
    }

    #[test]
    fn test_group_dn_is_escaped() {
        let connector = test_connector();
        assert_eq!(
            connector.group_dn("dns admins"),
            "cn=dns admins,ou=Groups,dc=example,dc=com"
        );
        assert_eq!(
            connector.group_dn("a,ou=evil"),
            "cn=a\\,ou\\=evil,ou=Groups,dc=example,dc=com"
        );
    }

    #[test]
    fn test_to_identity_hides_password() {
        let connector = test_connector();
        let mut entry = DirectoryEntry::new("uid=jdoe,ou=People,dc=example,dc=com");
        entry.attrs.insert("uid".to_string(), vec!["jdoe".to_string()]);
        entry.attrs.insert("cn".to_string(), vec!["John Doe".to_string()]);
        entry
            .attrs
            .insert("userPassword".to_string(), vec!["{SSHA}abc".to_string()]);

        let identity = connector.to_identity(&entry);
        assert_eq!(identity.key, "jdoe");
        assert_eq!(identity.attributes.get_string("cn"), Some("John Doe"));
        assert!(!identity.attributes.has("userPassword"));
    }

    #[test]
    fn test_dedup_names() {
        let names = vec![
            "Users".to_string(),
            "admins".to_string(),
            "users".to_string(),
        ];
        assert_eq!(dedup_names(names), vec!["Users".to_string(), "admins".to_string()]);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = LdapConfig::new("ldap", "ldap://h", "ou=P", "ou=G")
            .with_bind("cn=admin", "hunter2");
        let connector = LdapConnector::new(config).unwrap();
        assert!(!format!("{connector:?}").contains("hunter2"));
    }
}
