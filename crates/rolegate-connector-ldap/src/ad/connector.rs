//! AD backend wrapping LdapConnector with AD-specific behavior.
//!
//! The `AdConnector` delegates shared LDAP operations to the underlying
//! `LdapConnector` and overrides only what Active Directory does differently:
//! - bind identity is `<login>@<domain>`, not a DN
//! - `unicodePwd` encoding and the create-then-enable sequence
//! - built-in groups routed to `CN=Builtin`
//! - group listing across the ordinary and built-in containers

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use rolegate_connector::config::BackendConfig;
use rolegate_connector::error::{ConnectorError, ConnectorResult, ProvisioningStep};
use rolegate_connector::identity::{GroupNamespace, GroupReference, Identity};
use rolegate_connector::operation::{AttributeSet, AttributeValue, Filter};
use rolegate_connector::traits::{AuthenticateOp, Backend, GroupOp, SearchOp, UserOp};
use rolegate_connector::types::BackendType;

use crate::config::ActiveDirectoryConfig;
use crate::connector::{dedup_names, LdapConnector};
use crate::dn::child_dn;
use crate::session::{close_after, DirectorySession, SessionFactory};

use super::builtin::AD_BUILTIN_GROUPS;
use super::password::{encode_ad_password, AdCodec, UNICODE_PWD};
use super::user_account_control::UserAccountControl;

const SAM_ACCOUNT_NAME: &str = "sAMAccountName";
const USER_ACCOUNT_CONTROL: &str = "userAccountControl";

/// Active Directory backend wrapping LdapConnector.
pub struct AdConnector {
    /// AD-specific configuration.
    config: ActiveDirectoryConfig,

    /// Underlying LDAP connector for protocol operations.
    ldap: LdapConnector,

    /// Names routed to the built-in container.
    builtin_groups: &'static [&'static str],
}

impl AdConnector {
    /// Create a new AD backend from configuration.
    ///
    /// Fails with [`ConnectorError::MissingRequiredAttribute`] when `cn` or
    /// `unicodePwd` is not declared. Never connects.
    pub fn new(config: ActiveDirectoryConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let ldap = LdapConnector::new(config.to_ldap_config())?;
        Ok(Self::assemble(config, ldap))
    }

    /// Create a backend that opens sessions through `sessions`.
    pub fn with_session_factory(
        config: ActiveDirectoryConfig,
        sessions: Arc<dyn SessionFactory>,
    ) -> ConnectorResult<Self> {
        config.validate()?;
        let ldap = LdapConnector::with_session_factory(config.to_ldap_config(), sessions)?;
        Ok(Self::assemble(config, ldap))
    }

    fn assemble(config: ActiveDirectoryConfig, ldap: LdapConnector) -> Self {
        Self {
            config,
            ldap: ldap.with_codec(Arc::new(AdCodec)),
            builtin_groups: AD_BUILTIN_GROUPS,
        }
    }

    /// Use a different built-in group list (e.g. for an older domain level).
    #[must_use]
    pub fn with_builtin_groups(mut self, groups: &'static [&'static str]) -> Self {
        self.builtin_groups = groups;
        self
    }

    /// Get the AD configuration.
    pub fn config(&self) -> &ActiveDirectoryConfig {
        &self.config
    }

    /// Get the underlying LDAP connector.
    pub fn ldap(&self) -> &LdapConnector {
        &self.ldap
    }

    /// Classify a group name against the built-in list.
    pub fn classify_group(&self, name: &str) -> GroupReference {
        GroupReference::classify(name, self.builtin_groups)
    }

    /// DN of a group, under `CN=Builtin` for built-in names.
    pub fn group_dn(&self, group: &GroupReference) -> String {
        match group.namespace {
            GroupNamespace::Builtin => {
                child_dn("CN", &group.name, &self.config.builtin_container())
            }
            GroupNamespace::Ordinary => self.ldap.group_dn(&group.name),
        }
    }

    /// Filter used by `search_users`: people and users, never computers.
    pub fn search_filter(&self, query: &str) -> Filter {
        Filter::and(vec![
            Filter::or(vec![
                Filter::eq(SAM_ACCOUNT_NAME, query),
                Filter::starts_with("cn", query),
                Filter::starts_with("name", query),
                Filter::starts_with("sn", query),
                Filter::starts_with("givenName", query),
            ]),
            Filter::and(vec![
                Filter::eq("objectClass", "person"),
                Filter::eq("objectClass", "user"),
                Filter::negate(Filter::eq("objectClass", "computer")),
            ]),
        ])
    }

    /// Create the entry, then set the password and enable the account.
    async fn provision(
        &self,
        session: &mut dyn DirectorySession,
        mut attributes: AttributeSet,
    ) -> ConnectorResult<Identity> {
        let password = match attributes.remove(UNICODE_PWD) {
            Some(AttributeValue::String(password)) => password,
            Some(_) => {
                return Err(ConnectorError::InvalidData {
                    message: format!("{UNICODE_PWD} must be a single string value"),
                })
            }
            None => {
                return Err(ConnectorError::InvalidData {
                    message: format!("{UNICODE_PWD} is required to create a user"),
                })
            }
        };
        // Encode up front so a bad password never leaves a half-created user.
        let encoded_password = encode_ad_password(&password)?;

        let key = attributes
            .get_string(SAM_ACCOUNT_NAME)
            .ok_or_else(|| ConnectorError::InvalidData {
                message: format!("{SAM_ACCOUNT_NAME} is required to create a user"),
            })?
            .to_string();

        attributes.set("userPrincipalName", self.config.principal_name(&key));
        if !attributes.has("displayName") {
            if let Some(cn) = attributes.get("cn").cloned() {
                attributes.set("displayName", cn);
            }
        }

        let identity = self.ldap.create_entry(session, &attributes).await?;

        let password_change =
            AttributeSet::new().with(UNICODE_PWD, AttributeValue::Binary(encoded_password));
        if let Err(e) = self
            .ldap
            .replace_attributes(session, &identity.dn, &password_change)
            .await
        {
            warn!(backend = %self.config.name, dn = %identity.dn, error = %e, "Created user but could not set password");
            return Err(ConnectorError::partially_provisioned(
                key,
                identity.dn,
                ProvisioningStep::SetPassword,
                e,
            ));
        }

        let enable = AttributeSet::new().with(
            USER_ACCOUNT_CONTROL,
            u32::from(UserAccountControl::normal_account()),
        );
        if let Err(e) = self
            .ldap
            .replace_attributes(session, &identity.dn, &enable)
            .await
        {
            warn!(backend = %self.config.name, dn = %identity.dn, error = %e, "Created user but could not enable account");
            return Err(ConnectorError::partially_provisioned(
                key,
                identity.dn,
                ProvisioningStep::EnableAccount,
                e,
            ));
        }

        info!(backend = %self.config.name, key = %key, dn = %identity.dn, "AD account created and enabled");
        Ok(identity)
    }

    async fn read_account_control(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
    ) -> ConnectorResult<(String, UserAccountControl)> {
        let entry = self
            .ldap
            .find_user(session, key, &[USER_ACCOUNT_CONTROL.to_string()])
            .await?;

        // Absent usually means the service account may not read it.
        let raw = entry.first(USER_ACCOUNT_CONTROL).ok_or_else(|| ConnectorError::InvalidData {
            message: format!("{USER_ACCOUNT_CONTROL} is not readable on {}", entry.dn),
        })?;
        let flags = raw.trim().parse::<u32>().map(UserAccountControl::from).map_err(|_| {
            ConnectorError::InvalidData {
                message: format!("Invalid userAccountControl value: {raw}"),
            }
        })?;
        Ok((entry.dn, flags))
    }

    async fn update_account_control(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
        change: fn(UserAccountControl) -> UserAccountControl,
    ) -> ConnectorResult<UserAccountControl> {
        let (dn, current) = self.read_account_control(session, key).await?;
        let updated = change(current);
        if updated != current {
            let attributes = AttributeSet::new().with(USER_ACCOUNT_CONTROL, u32::from(updated));
            self.ldap.replace_attributes(session, &dn, &attributes).await?;
        }
        Ok(updated)
    }

    /// Current account flags of a user.
    #[instrument(skip(self))]
    pub async fn account_control(&self, key: &str) -> ConnectorResult<UserAccountControl> {
        let mut session = self.ldap.service_session().await?;
        let result = self
            .read_account_control(session.as_mut(), key)
            .await
            .map(|(_, uac)| uac);
        close_after(session, result).await
    }

    /// Clear ACCOUNTDISABLE, keeping every other flag.
    #[instrument(skip(self))]
    pub async fn enable_account(&self, key: &str) -> ConnectorResult<()> {
        let mut session = self.ldap.service_session().await?;
        let result = self
            .update_account_control(session.as_mut(), key, UserAccountControl::enable)
            .await;
        let uac = close_after(session, result).await?;
        info!(backend = %self.config.name, key = %key, uac = %uac, "AD account enabled");
        Ok(())
    }

    /// Set ACCOUNTDISABLE, keeping every other flag.
    #[instrument(skip(self))]
    pub async fn disable_account(&self, key: &str) -> ConnectorResult<()> {
        let mut session = self.ldap.service_session().await?;
        let result = self
            .update_account_control(session.as_mut(), key, UserAccountControl::disable)
            .await;
        let uac = close_after(session, result).await?;
        info!(backend = %self.config.name, key = %key, uac = %uac, "AD account disabled");
        Ok(())
    }

    async fn change_memberships(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
        groups: &[String],
        add: bool,
    ) -> ConnectorResult<()> {
        let user = self.ldap.find_user_dn(session, key).await?;
        for name in groups {
            let group = self.classify_group(name);
            let group_dn = self.group_dn(&group);
            if add {
                self.ldap
                    .add_membership(session, &user, key, &group.name, &group_dn)
                    .await?;
            } else {
                self.ldap
                    .remove_membership(session, &user, key, &group.name, &group_dn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn collect_groups(
        &self,
        session: &mut dyn DirectorySession,
        key: &str,
    ) -> ConnectorResult<Vec<String>> {
        let user = self.ldap.find_user_dn(session, key).await?;
        let filter = Filter::eq("member", &user.dn);

        let mut names = self
            .ldap
            .group_names_under(session, &self.config.user_container(), &filter)
            .await?;
        names.extend(
            self.ldap
                .group_names_under(session, &self.config.builtin_container(), &filter)
                .await?,
        );
        Ok(dedup_names(names))
    }
}

#[async_trait]
impl Backend for AdConnector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Ad
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        self.ldap.test_connection().await
    }
}

#[async_trait]
impl AuthenticateOp for AdConnector {
    #[instrument(skip(self, secret))]
    async fn authenticate(&self, key: &str, secret: &str) -> ConnectorResult<bool> {
        self.ldap
            .check_credentials(&self.config.principal_name(key), secret)
            .await
    }
}

#[async_trait]
impl UserOp for AdConnector {
    #[instrument(skip(self, attributes))]
    async fn create_user(&self, attributes: AttributeSet) -> ConnectorResult<Identity> {
        let mut session = self.ldap.service_session().await?;
        let result = self.provision(session.as_mut(), attributes).await;
        close_after(session, result).await
    }

    async fn get_user(&self, key: &str) -> ConnectorResult<Identity> {
        self.ldap.get_user(key).await
    }

    async fn set_attributes(&self, key: &str, attributes: AttributeSet) -> ConnectorResult<()> {
        self.ldap.set_attributes(key, attributes).await
    }

    async fn set_password(&self, key: &str, secret: &str) -> ConnectorResult<()> {
        self.ldap.set_password(key, secret).await
    }

    async fn delete_user(&self, key: &str) -> ConnectorResult<()> {
        self.ldap.delete_user(key).await
    }
}

#[async_trait]
impl GroupOp for AdConnector {
    #[instrument(skip(self))]
    async fn add_to_groups(&self, key: &str, groups: &[String]) -> ConnectorResult<()> {
        let mut session = self.ldap.service_session().await?;
        let result = self.change_memberships(session.as_mut(), key, groups, true).await;
        close_after(session, result).await
    }

    #[instrument(skip(self))]
    async fn remove_from_groups(&self, key: &str, groups: &[String]) -> ConnectorResult<()> {
        let mut session = self.ldap.service_session().await?;
        let result = self.change_memberships(session.as_mut(), key, groups, false).await;
        close_after(session, result).await
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, key: &str) -> ConnectorResult<Vec<String>> {
        let mut session = self.ldap.service_session().await?;
        let result = self.collect_groups(session.as_mut(), key).await;
        close_after(session, result).await
    }
}

#[async_trait]
impl SearchOp for AdConnector {
    #[instrument(skip(self))]
    async fn search_users(&self, query: &str) -> ConnectorResult<Vec<Identity>> {
        let filter = self.search_filter(query);
        let mut session = self.ldap.service_session().await?;
        let result = self.ldap.search_entries(session.as_mut(), &filter).await;
        close_after(session, result).await
    }
}

impl std::fmt::Debug for AdConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdConnector")
            .field("config", &self.config.redacted())
            .field("builtin_groups", &self.builtin_groups.len())
            .finish()
    }
}
