//! Role catalog loading and resolution against fixture files.

use std::io::Write;
use std::path::PathBuf;

use rolegate_roles::{RoleCatalog, RoleError};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_load_nominal() {
    let catalog = RoleCatalog::load(fixture("roles.yml")).unwrap();

    assert_eq!(
        catalog.keys().collect::<Vec<_>>(),
        vec!["users", "developers", "admin-lv3", "admin-lv2"]
    );
    assert_eq!(catalog.display_name("admin-lv2"), Some("Administrators Level 2"));
    assert_eq!(catalog.admin_roles(), vec!["admin-lv3"]);
    catalog.check_backends(&["ad", "ldap"]).unwrap();
}

#[test]
fn test_missing_display_name() {
    let err = RoleCatalog::load(fixture("roles_missing_display_name.yml")).unwrap_err();
    assert!(matches!(
        err,
        RoleError::MissingKey { ref role, key: "display_name" } if role == "developers"
    ));
    assert!(err.is_configuration());
}

#[test]
fn test_missing_backends() {
    let err = RoleCatalog::load(fixture("roles_missing_backends.yml")).unwrap_err();
    assert!(matches!(err, RoleError::MissingKey { key: "backends", .. }));
}

#[test]
fn test_duplicate_role_key() {
    let err = RoleCatalog::load(fixture("roles_key_dup.yml")).unwrap_err();
    assert!(matches!(err, RoleError::DuplicateRoleKey { ref role } if role == "users"));
}

#[test]
fn test_duplicate_key_across_subroles() {
    let err = RoleCatalog::load(fixture("roles_subrole_key_dup.yml")).unwrap_err();
    assert!(matches!(err, RoleError::DuplicateRoleKey { ref role } if role == "admin-lv2"));
}

#[test]
fn test_duplicate_role_content() {
    let err = RoleCatalog::load(fixture("roles_content_dup.yml")).unwrap_err();
    assert!(matches!(
        err,
        RoleError::DuplicateRoleContent { ref role, ref duplicate_of }
            if role == "engineers" && duplicate_of == "developers"
    ));
}

#[test]
fn test_missing_roles_file() {
    let err = RoleCatalog::load(fixture("dontexist")).unwrap_err();
    assert!(matches!(err, RoleError::MissingRolesFile { .. }));
    assert_eq!(err.error_code(), "MISSING_ROLES_FILE");
}

#[test]
fn test_invalid_yaml_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "users:\n  display_name: [unclosed").unwrap();

    let err = RoleCatalog::load(file.path()).unwrap_err();
    assert!(matches!(err, RoleError::Parse { .. }));
}

#[test]
fn test_error_kinds_are_distinct() {
    let codes: Vec<&str> = [
        "roles_missing_display_name.yml",
        "roles_key_dup.yml",
        "roles_content_dup.yml",
        "dontexist",
    ]
    .iter()
    .map(|name| RoleCatalog::load(fixture(name)).unwrap_err().error_code())
    .collect();

    assert_eq!(
        codes,
        vec![
            "MISSING_KEY",
            "DUPLICATE_ROLE_KEY",
            "DUPLICATE_ROLE_CONTENT",
            "MISSING_ROLES_FILE"
        ]
    );
}

#[test]
fn test_resolve_end_to_end() {
    let yaml = r#"
R1:
  display_name: Role one
  backends:
    B:
      groups: [Users]
R2:
  display_name: Role two
  backends:
    B:
      groups: [Administrators]
      attributes:
        displayName: X
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    let catalog = RoleCatalog::load(file.path()).unwrap();

    let delta = catalog.resolve(&["R1", "R2"]).unwrap();
    let b = delta.backend("B").unwrap();
    assert_eq!(b.group_list(), vec!["Administrators", "Users"]);
    assert_eq!(b.attributes.len(), 1);
    assert_eq!(b.attributes["displayName"], "X");
    assert!(!delta.has_conflicts());
}

#[test]
fn test_resolve_fixture_roles() {
    let catalog = RoleCatalog::load(fixture("roles.yml")).unwrap();
    let delta = catalog.resolve(&["users", "developers", "admin-lv2"]).unwrap();

    let ldap = delta.backend("ldap").unwrap();
    assert_eq!(ldap.group_list(), vec!["developers", "dns admins", "users"]);
    assert_eq!(ldap.attributes["loginShell"], "/bin/bash");

    let ad = delta.backend("ad").unwrap();
    assert_eq!(
        ad.group_list(),
        vec!["Administrators", "Domain Admins", "Domain Users"]
    );
    assert_eq!(ad.attribute_set().get_string("title"), Some("Administrator"));
}
