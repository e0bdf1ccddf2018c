//! Built-in group names.
//!
//! These groups live under `CN=Builtin,<base>` instead of the ordinary group
//! container. The list is fixed data; adapters receive it by reference.

/// Built-in groups of a Windows Server 2008 R2 or later domain.
pub const AD_BUILTIN_GROUPS: &[&str] = &[
    "Pre-Windows 2000 Compatible Access",
    "Windows Authorization Access Group",
    "Certificate Service DCOM Access",
    "Network Configuration Operators",
    "Terminal Server License Servers",
    "Incoming Forest Trust Builders",
    "Performance Monitor Users",
    "Cryptographic Operators",
    "Distributed COM Users",
    "Performance Log Users",
    "Remote Desktop Users",
    "Account Operators",
    "Event Log Readers",
    "Backup Operators",
    "Server Operators",
    "Print Operators",
    "Administrators",
    "Replicator",
    "IIS_IUSRS",
    "Guests",
    "Users",
];
