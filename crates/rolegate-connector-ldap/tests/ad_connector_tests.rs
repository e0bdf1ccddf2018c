//! Active Directory backend tests against the in-memory directory.

mod common;

use common::{MemoryDirectory, Op};
use rolegate_connector::error::{ConnectorError, ProvisioningStep};
use rolegate_connector::operation::AttributeSet;
use rolegate_connector::traits::{AuthenticateOp, GroupOp, SearchOp, UserOp};
use rolegate_connector_ldap::ad::{encode_ad_password, AdConnector, UserAccountControl};
use rolegate_connector_ldap::ActiveDirectoryConfig;

const BASE: &str = "DC=example,DC=com";
const CONTAINER: &str = "OU=Users,OU=example,DC=example,DC=com";
const BUILTIN: &str = "CN=Builtin,DC=example,DC=com";
const JDOE: &str = "CN=John Doe,OU=Users,OU=example,DC=example,DC=com";

fn config() -> ActiveDirectoryConfig {
    ActiveDirectoryConfig::new("ad", "ldaps://dc.example.com", "example.com")
        .with_login("Administrator", "secret")
        .with_attributes(["cn", "sn", "givenName", "displayName", "unicodePwd", "sAMAccountName"])
}

fn group(dir: &MemoryDirectory, dn: &str, name: &str, members: &[&str]) {
    dir.insert(
        dn,
        &[("objectClass", &["top", "group"]), ("cn", &[name]), ("member", members)],
    );
}

fn directory() -> MemoryDirectory {
    let dir = MemoryDirectory::new();
    dir.insert_container(BASE);
    dir.insert_container("OU=example,DC=example,DC=com");
    dir.insert_container(CONTAINER);
    dir.insert_container(BUILTIN);
    dir.allow_bind("Administrator@example.com", "secret");

    dir.insert(
        JDOE,
        &[
            ("objectClass", &["top", "person", "organizationalPerson", "user"]),
            ("cn", &["John Doe"]),
            ("sn", &["Doe"]),
            ("sAMAccountName", &["jdoe"]),
            ("userPrincipalName", &["jdoe@example.com"]),
            ("userAccountControl", &["512"]),
        ],
    );
    dir.allow_bind("jdoe@example.com", "Corr3ct!");

    group(&dir, &format!("CN=Staff,{CONTAINER}"), "Staff", &[JDOE]);
    group(&dir, &format!("CN=Developers,{CONTAINER}"), "Developers", &[]);
    group(&dir, &format!("CN=Users,{CONTAINER}"), "Users", &[JDOE]);
    group(&dir, &format!("CN=Users,{BUILTIN}"), "Users", &[JDOE]);
    group(&dir, &format!("CN=Remote Desktop Users,{BUILTIN}"), "Remote Desktop Users", &[JDOE]);
    group(&dir, &format!("CN=Backup Operators,{BUILTIN}"), "Backup Operators", &[]);
    dir
}

fn connector(dir: &MemoryDirectory) -> AdConnector {
    AdConnector::with_session_factory(config(), dir.factory()).unwrap()
}

fn new_user() -> AttributeSet {
    AttributeSet::new()
        .with("sAMAccountName", "alice")
        .with("cn", "Alice Liddell")
        .with("sn", "Liddell")
        .with("unicodePwd", "Wonder1and!")
}

const ALICE: &str = "CN=Alice Liddell,OU=Users,OU=example,DC=example,DC=com";

#[tokio::test]
async fn test_create_user_sequence() {
    let dir = directory();
    let backend = connector(&dir);

    let identity = backend.create_user(new_user()).await.unwrap();
    assert_eq!(identity.key, "alice");
    assert_eq!(identity.dn, ALICE);
    assert!(!identity.attributes.has("unicodePwd"));

    assert!(dir.has_value(ALICE, "userPrincipalName", "alice@example.com"));
    assert!(dir.has_value(ALICE, "displayName", "Alice Liddell"));
    assert!(dir.has_value(ALICE, "objectClass", "user"));
    assert_eq!(
        dir.values(ALICE, "unicodePwd"),
        vec![encode_ad_password("Wonder1and!").unwrap()]
    );
    assert_eq!(dir.strings(ALICE, "userAccountControl"), vec!["512".to_string()]);

    let writes: Vec<String> = dir
        .log()
        .into_iter()
        .filter(|op| op.starts_with("add") || op.starts_with("modify"))
        .collect();
    assert_eq!(
        writes,
        vec![
            format!("add {ALICE}"),
            format!("modify {ALICE} [unicodePwd]"),
            format!("modify {ALICE} [userAccountControl]"),
        ]
    );
    dir.assert_no_open_sessions();
    assert_eq!(dir.sessions_opened(), 1);
}

#[tokio::test]
async fn test_create_user_keeps_display_name() {
    let dir = directory();
    let backend = connector(&dir);

    backend
        .create_user(new_user().with("displayName", "Alice L."))
        .await
        .unwrap();
    assert_eq!(dir.strings(ALICE, "displayName"), vec!["Alice L.".to_string()]);
}

#[tokio::test]
async fn test_create_user_without_password() {
    let dir = directory();
    let backend = connector(&dir);

    let mut attributes = new_user();
    attributes.remove("unicodePwd");
    let err = backend.create_user(attributes).await.unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidData { .. }));
    assert!(!dir.exists(ALICE));
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_create_user_password_step_fails() {
    let dir = directory();
    dir.fail(Op::Modify, Some("unicodePwd"), || {
        ConnectorError::operation_failed("unwilling to perform: password policy")
    });
    let backend = connector(&dir);

    let err = backend.create_user(new_user()).await.unwrap_err();
    match err {
        ConnectorError::PartiallyProvisioned { key, dn, step, .. } => {
            assert_eq!(key, "alice");
            assert_eq!(dn, ALICE);
            assert_eq!(step, ProvisioningStep::SetPassword);
        }
        other => panic!("expected PartiallyProvisioned, got {other:?}"),
    }

    // The entry stays behind and is never enabled.
    assert!(dir.exists(ALICE));
    assert!(dir.values(ALICE, "userAccountControl").is_empty());
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_create_user_enable_step_fails() {
    let dir = directory();
    dir.fail(Op::Modify, Some("userAccountControl"), || {
        ConnectorError::operation_failed("insufficient access rights")
    });
    let backend = connector(&dir);

    let err = backend.create_user(new_user()).await.unwrap_err();
    assert_eq!(err.error_code(), "PARTIALLY_PROVISIONED");
    assert!(matches!(
        err,
        ConnectorError::PartiallyProvisioned { step: ProvisioningStep::EnableAccount, .. }
    ));
    assert!(!dir.values(ALICE, "unicodePwd").is_empty());
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_missing_required_attribute_never_connects() {
    let dir = directory();
    let config = ActiveDirectoryConfig::new("ad", "ldaps://dc.example.com", "example.com")
        .with_login("Administrator", "secret")
        .with_attributes(["sn", "unicodePwd"]);

    let err = AdConnector::with_session_factory(config, dir.factory()).unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::MissingRequiredAttribute { ref attribute, .. } if attribute == "cn"
    ));
    assert_eq!(dir.sessions_opened(), 0);
}

#[tokio::test]
async fn test_builtin_group_routing() {
    let dir = directory();
    let backend = connector(&dir);

    backend
        .add_to_groups("jdoe", &["Backup Operators".to_string(), "Developers".to_string()])
        .await
        .unwrap();

    assert!(dir.has_value(&format!("CN=Backup Operators,{BUILTIN}"), "member", JDOE));
    assert!(dir.has_value(&format!("CN=Developers,{CONTAINER}"), "member", JDOE));
    assert!(!dir.exists(&format!("CN=Backup Operators,{CONTAINER}")));
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_builtin_name_is_case_insensitive() {
    let dir = directory();
    let backend = connector(&dir);

    backend
        .add_to_groups("jdoe", &["backup operators".to_string()])
        .await
        .unwrap();
    assert!(dir.has_value(&format!("CN=Backup Operators,{BUILTIN}"), "member", JDOE));
}

#[tokio::test]
async fn test_membership_changes_are_idempotent() {
    let dir = directory();
    let backend = connector(&dir);
    let staff = vec!["Staff".to_string()];

    // Already a member.
    backend.add_to_groups("jdoe", &staff).await.unwrap();
    assert_eq!(dir.strings(&format!("CN=Staff,{CONTAINER}"), "member").len(), 1);

    backend.remove_from_groups("jdoe", &staff).await.unwrap();
    backend.remove_from_groups("jdoe", &staff).await.unwrap();
    assert!(!dir.has_value(&format!("CN=Staff,{CONTAINER}"), "member", JDOE));
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_unknown_group() {
    let dir = directory();
    let backend = connector(&dir);

    let err = backend
        .add_to_groups("jdoe", &["Nonexistent".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::GroupNotFound { ref group } if group == "Nonexistent"));
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_list_groups_spans_both_containers() {
    let dir = directory();
    let backend = connector(&dir);

    let mut groups = backend.list_groups("jdoe").await.unwrap();
    groups.sort();
    assert_eq!(groups, vec!["Remote Desktop Users", "Staff", "Users"]);

    let searched: Vec<String> = dir
        .log()
        .into_iter()
        .filter(|op| op.starts_with("search"))
        .collect();
    assert!(searched.contains(&format!("search {CONTAINER}")));
    assert!(searched.contains(&format!("search {BUILTIN}")));
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_authenticate() {
    let dir = directory();
    let backend = connector(&dir);

    assert!(backend.authenticate("jdoe", "Corr3ct!").await.unwrap());
    assert!(!backend.authenticate("jdoe", "wrong").await.unwrap());
    assert!(!backend.authenticate("jdoe", "").await.unwrap());
    assert!(dir.log().contains(&"bind jdoe@example.com".to_string()));
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_authenticate_connection_error() {
    let dir = directory();
    dir.fail(Op::Connect, None, || {
        ConnectorError::connection_failed("connection refused")
    });
    let backend = connector(&dir);

    let err = backend.authenticate("jdoe", "Corr3ct!").await.unwrap_err();
    assert!(matches!(err, ConnectorError::ConnectionFailed { .. }));
}

#[tokio::test]
async fn test_disable_and_enable_account() {
    let dir = directory();
    let backend = connector(&dir);

    backend.disable_account("jdoe").await.unwrap();
    assert_eq!(dir.strings(JDOE, "userAccountControl"), vec!["514".to_string()]);
    assert!(backend.account_control("jdoe").await.unwrap().is_disabled());

    dir.clear_log();
    backend.disable_account("jdoe").await.unwrap();
    assert!(!dir.log().iter().any(|op| op.starts_with("modify")));

    backend.enable_account("jdoe").await.unwrap();
    let uac = backend.account_control("jdoe").await.unwrap();
    assert_eq!(uac, UserAccountControl::normal_account());
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_account_control_requires_readable_flags() {
    let dir = directory();
    dir.insert(
        ALICE,
        &[
            ("objectClass", &["top", "person", "organizationalPerson", "user"]),
            ("cn", &["Alice Liddell"]),
            ("sAMAccountName", &["alice"]),
        ],
    );
    let backend = connector(&dir);

    let err = backend.account_control("alice").await.unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidData { .. }));
    assert!(err.to_string().contains("userAccountControl"));

    dir.clear_log();
    let err = backend.disable_account("alice").await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_DATA");
    assert!(!dir.log().iter().any(|op| op.starts_with("modify")));
    assert!(dir.strings(ALICE, "userAccountControl").is_empty());
    dir.assert_no_open_sessions();
}

#[tokio::test]
async fn test_set_password_is_utf16() {
    let dir = directory();
    let backend = connector(&dir);

    backend.set_password("jdoe", "N3w-pass").await.unwrap();
    assert_eq!(
        dir.values(JDOE, "unicodePwd"),
        vec![encode_ad_password("N3w-pass").unwrap()]
    );
}

#[tokio::test]
async fn test_get_user_hides_password() {
    let dir = directory();
    let backend = connector(&dir);
    backend.set_password("jdoe", "N3w-pass").await.unwrap();

    let user = backend.get_user("jdoe").await.unwrap();
    assert_eq!(user.dn, JDOE);
    assert_eq!(user.attributes.get_string("sn"), Some("Doe"));
    assert!(!user.attributes.has("unicodePwd"));
}

#[tokio::test]
async fn test_search_skips_computers() {
    let dir = directory();
    dir.insert(
        &format!("CN=JDOE-LAPTOP,{CONTAINER}"),
        &[
            ("objectClass", &["top", "person", "organizationalPerson", "user", "computer"]),
            ("cn", &["JDOE-LAPTOP"]),
            ("sAMAccountName", &["JDOE-LAPTOP$"]),
        ],
    );
    let backend = connector(&dir);

    let found = backend.search_users("jdo").await.unwrap();
    assert_eq!(found.len(), 0);

    let found = backend.search_users("Joh").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "jdoe");
}
