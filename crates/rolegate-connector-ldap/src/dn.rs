//! Distinguished name helpers.

/// Escape special characters in DN attribute values per RFC 4514.
///
/// DN escaping is different from filter escaping. Characters that must be escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Build a one-level DN: `<attribute>=<escaped value>,<parent>`.
pub fn child_dn(attribute: &str, value: &str, parent: &str) -> String {
    format!("{attribute}={},{parent}", escape_dn_value(value))
}

/// `example.com` -> `DC=example,DC=com`.
pub fn domain_to_base_dn(domain: &str) -> String {
    domain
        .split('.')
        .filter(|label| !label.is_empty())
        .map(|label| format!("DC={label}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Leftmost label of a DNS domain (`ad.example.com` -> `ad`).
pub fn first_domain_label(domain: &str) -> &str {
    domain.split('.').next().unwrap_or(domain)
}
