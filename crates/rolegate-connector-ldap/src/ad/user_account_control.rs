//! `userAccountControl` bit flags.
//!
//! Account state in Active Directory is a single 32-bit integer. Callers use
//! the named constants and helpers here rather than raw numbers.

use std::fmt;

/// Decoded `userAccountControl` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserAccountControl {
    pub value: u32,
}

impl UserAccountControl {
    pub const SCRIPT: u32 = 0x0000_0001;
    pub const ACCOUNTDISABLE: u32 = 0x0000_0002;
    pub const HOMEDIR_REQUIRED: u32 = 0x0000_0008;
    pub const LOCKOUT: u32 = 0x0000_0010;
    pub const PASSWD_NOTREQD: u32 = 0x0000_0020;
    pub const PASSWD_CANT_CHANGE: u32 = 0x0000_0040;
    pub const ENCRYPTED_TEXT_PWD_ALLOWED: u32 = 0x0000_0080;
    pub const TEMP_DUPLICATE_ACCOUNT: u32 = 0x0000_0100;
    pub const NORMAL_ACCOUNT: u32 = 0x0000_0200;
    pub const INTERDOMAIN_TRUST_ACCOUNT: u32 = 0x0000_0800;
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x0000_1000;
    pub const SERVER_TRUST_ACCOUNT: u32 = 0x0000_2000;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x0001_0000;
    pub const MNS_LOGON_ACCOUNT: u32 = 0x0002_0000;
    pub const SMARTCARD_REQUIRED: u32 = 0x0004_0000;
    pub const TRUSTED_FOR_DELEGATION: u32 = 0x0008_0000;
    pub const NOT_DELEGATED: u32 = 0x0010_0000;
    pub const USE_DES_KEY_ONLY: u32 = 0x0020_0000;
    pub const DONT_REQ_PREAUTH: u32 = 0x0040_0000;
    pub const PASSWORD_EXPIRED: u32 = 0x0080_0000;
    pub const TRUSTED_TO_AUTH_FOR_DELEGATION: u32 = 0x0100_0000;
    pub const PARTIAL_SECRETS_ACCOUNT: u32 = 0x0400_0000;

    /// Named flags, in bit order.
    pub const NAMED_FLAGS: &'static [(u32, &'static str)] = &[
        (Self::SCRIPT, "SCRIPT"),
        (Self::ACCOUNTDISABLE, "ACCOUNTDISABLE"),
        (Self::HOMEDIR_REQUIRED, "HOMEDIR_REQUIRED"),
        (Self::LOCKOUT, "LOCKOUT"),
        (Self::PASSWD_NOTREQD, "PASSWD_NOTREQD"),
        (Self::PASSWD_CANT_CHANGE, "PASSWD_CANT_CHANGE"),
        (Self::ENCRYPTED_TEXT_PWD_ALLOWED, "ENCRYPTED_TEXT_PWD_ALLOWED"),
        (Self::TEMP_DUPLICATE_ACCOUNT, "TEMP_DUPLICATE_ACCOUNT"),
        (Self::NORMAL_ACCOUNT, "NORMAL_ACCOUNT"),
        (Self::INTERDOMAIN_TRUST_ACCOUNT, "INTERDOMAIN_TRUST_ACCOUNT"),
        (Self::WORKSTATION_TRUST_ACCOUNT, "WORKSTATION_TRUST_ACCOUNT"),
        (Self::SERVER_TRUST_ACCOUNT, "SERVER_TRUST_ACCOUNT"),
        (Self::DONT_EXPIRE_PASSWORD, "DONT_EXPIRE_PASSWORD"),
        (Self::MNS_LOGON_ACCOUNT, "MNS_LOGON_ACCOUNT"),
        (Self::SMARTCARD_REQUIRED, "SMARTCARD_REQUIRED"),
        (Self::TRUSTED_FOR_DELEGATION, "TRUSTED_FOR_DELEGATION"),
        (Self::NOT_DELEGATED, "NOT_DELEGATED"),
        (Self::USE_DES_KEY_ONLY, "USE_DES_KEY_ONLY"),
        (Self::DONT_REQ_PREAUTH, "DONT_REQ_PREAUTH"),
        (Self::PASSWORD_EXPIRED, "PASSWORD_EXPIRED"),
        (Self::TRUSTED_TO_AUTH_FOR_DELEGATION, "TRUSTED_TO_AUTH_FOR_DELEGATION"),
        (Self::PARTIAL_SECRETS_ACCOUNT, "PARTIAL_SECRETS_ACCOUNT"),
    ];

    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self { value }
    }

    /// A normal, enabled user account (512).
    #[must_use]
    pub const fn normal_account() -> Self {
        Self::from_value(Self::NORMAL_ACCOUNT)
    }

    #[must_use]
    pub const fn contains(&self, flag: u32) -> bool {
        self.value & flag == flag
    }

    #[must_use]
    pub const fn with(self, flag: u32) -> Self {
        Self::from_value(self.value | flag)
    }

    #[must_use]
    pub const fn without(self, flag: u32) -> Self {
        Self::from_value(self.value & !flag)
    }

    /// Set ACCOUNTDISABLE, keeping every other flag.
    #[must_use]
    pub const fn disable(self) -> Self {
        self.with(Self::ACCOUNTDISABLE)
    }

    /// Clear ACCOUNTDISABLE, keeping every other flag.
    #[must_use]
    pub const fn enable(self) -> Self {
        self.without(Self::ACCOUNTDISABLE)
    }

    pub const fn is_disabled(&self) -> bool {
        self.contains(Self::ACCOUNTDISABLE)
    }

    pub const fn is_locked_out(&self) -> bool {
        self.contains(Self::LOCKOUT)
    }

    pub const fn password_never_expires(&self) -> bool {
        self.contains(Self::DONT_EXPIRE_PASSWORD)
    }

    /// A normal account that is not disabled.
    pub const fn is_active(&self) -> bool {
        self.contains(Self::NORMAL_ACCOUNT) && !self.is_disabled()
    }

    /// Names of the set flags, in bit order.
    pub fn flag_names(&self) -> Vec<&'static str> {
        Self::NAMED_FLAGS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl From<u32> for UserAccountControl {
    fn from(value: u32) -> Self {
        Self::from_value(value)
    }
}

impl From<UserAccountControl> for u32 {
    fn from(uac: UserAccountControl) -> Self {
        uac.value
    }
}

impl fmt::Display for UserAccountControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
