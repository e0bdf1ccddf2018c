//! Attribute encoding between [`AttributeValue`] and LDAP octet strings.

use rolegate_connector::error::ConnectorResult;
use rolegate_connector::operation::{AttributeSet, AttributeValue};

use crate::session::DirectoryEntry;

/// Turns an attribute value into the octet strings sent on the wire.
///
/// Dialects override this for attributes with special syntaxes.
pub trait AttributeCodec: Send + Sync {
    fn encode(&self, attribute: &str, value: &AttributeValue) -> ConnectorResult<Vec<Vec<u8>>>;
}

/// UTF-8 strings, decimal integers, `TRUE`/`FALSE`, raw binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericCodec;

impl AttributeCodec for GenericCodec {
    fn encode(&self, _attribute: &str, value: &AttributeValue) -> ConnectorResult<Vec<Vec<u8>>> {
        Ok(encode_value(value))
    }
}

/// Generic encoding. Empty strings produce no value, so a replace with an
/// empty string clears the attribute.
pub fn encode_value(value: &AttributeValue) -> Vec<Vec<u8>> {
    match value {
        AttributeValue::String(s) if s.is_empty() => vec![],
        AttributeValue::String(s) => vec![s.as_bytes().to_vec()],
        AttributeValue::Integer(i) => vec![i.to_string().into_bytes()],
        AttributeValue::Boolean(b) => vec![if *b { b"TRUE".to_vec() } else { b"FALSE".to_vec() }],
        AttributeValue::Binary(bytes) => vec![bytes.clone()],
        AttributeValue::Array(values) => values.iter().flat_map(encode_value).collect(),
    }
}

/// Read `attributes` from an entry. Absent attributes are left out; names in
/// `hidden` are never returned.
pub fn decode_entry(entry: &DirectoryEntry, attributes: &[String], hidden: &[&str]) -> AttributeSet {
    let mut set = AttributeSet::new();

    for name in attributes {
        if hidden.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }

        let text = entry.values(name);
        let binary = entry.binary_values(name);

        let value = match (text, binary) {
            ([single], []) => AttributeValue::String(single.clone()),
            ([], [single]) => AttributeValue::Binary(single.clone()),
            ([], []) => continue,
            (text, binary) => AttributeValue::Array(
                text.iter()
                    .cloned()
                    .map(AttributeValue::String)
                    .chain(binary.iter().cloned().map(AttributeValue::Binary))
                    .collect(),
            ),
        };
        set.set(name.clone(), value);
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_value() {
        assert_eq!(encode_value(&"test".into()), vec![b"test".to_vec()]);
        assert_eq!(encode_value(&AttributeValue::Integer(42)), vec![b"42".to_vec()]);
        assert_eq!(encode_value(&true.into()), vec![b"TRUE".to_vec()]);
        assert_eq!(encode_value(&"".into()), Vec::<Vec<u8>>::new());
        assert_eq!(
            encode_value(&vec!["a".to_string(), "b".to_string()].into()),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_decode_entry() {
        let mut entry = DirectoryEntry::new("uid=jdoe,ou=People,dc=example,dc=com");
        entry.attrs.insert("uid".to_string(), vec!["jdoe".to_string()]);
        entry.attrs.insert(
            "mail".to_string(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()],
        );
        entry
            .attrs
            .insert("userPassword".to_string(), vec!["{SSHA}x".to_string()]);
        entry.bin_attrs.insert("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]]);

        let wanted: Vec<String> = ["UID", "mail", "userPassword", "jpegPhoto", "sn"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let set = decode_entry(&entry, &wanted, &["userpassword"]);

        assert_eq!(set.get_string("uid"), Some("jdoe"));
        assert_eq!(set.get("mail").map(|v| v.as_strings().len()), Some(2));
        assert_eq!(set.get("jpegPhoto"), Some(&AttributeValue::Binary(vec![0xff, 0xd8])));
        assert!(!set.has("userPassword"));
        assert!(!set.has("sn"));
    }
}
