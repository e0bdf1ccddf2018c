//! AD password encoding for the `unicodePwd` attribute.
//!
//! Active Directory requires passwords to be set via the `unicodePwd` attribute
//! using a specific encoding:
//! 1. Surround the password with double quotes: `"password"`
//! 2. Encode the quoted string as UTF-16LE bytes
//!
//! The server refuses `unicodePwd` modifications over unencrypted connections.

use tracing::instrument;

use rolegate_connector::error::{ConnectorError, ConnectorResult};
use rolegate_connector::operation::AttributeValue;

use crate::codec::{encode_value, AttributeCodec};

/// Name of the AD password attribute.
pub const UNICODE_PWD: &str = "unicodePwd";

/// Encode a plaintext password for AD's unicodePwd attribute.
///
/// # Errors
/// Returns an error if the password is empty.
#[instrument(skip(password))]
pub fn encode_ad_password(password: &str) -> ConnectorResult<Vec<u8>> {
    if password.is_empty() {
        return Err(ConnectorError::InvalidData {
            message: "Password cannot be empty".to_string(),
        });
    }

    let quoted = format!("\"{password}\"");
    Ok(quoted.encode_utf16().flat_map(u16::to_le_bytes).collect())
}

/// Attribute codec for Active Directory.
///
/// `unicodePwd` gets the quoted UTF-16LE encoding; everything else is
/// encoded generically.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdCodec;

impl AttributeCodec for AdCodec {
    fn encode(&self, attribute: &str, value: &AttributeValue) -> ConnectorResult<Vec<Vec<u8>>> {
        if !attribute.eq_ignore_ascii_case(UNICODE_PWD) {
            return Ok(encode_value(value));
        }

        match value {
            AttributeValue::String(password) => Ok(vec![encode_ad_password(password)?]),
            // Already encoded.
            AttributeValue::Binary(bytes) => Ok(vec![bytes.clone()]),
            _ => Err(ConnectorError::InvalidData {
                message: format!("{UNICODE_PWD} must be a single string value"),
            }),
        }
    }
}
