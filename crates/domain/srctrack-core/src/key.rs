//! Metadata keys correlate local components with remote records.
//!
//! Remote names may arrive percent-encoded (`Account%20Layout`) while the local
//! resolver produces decoded names, so keys are always built from decoded names.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;

/// Separator used by the current tracking file schema.
pub const KEY_SEPARATOR: &str = "###";

/// Separator used by the legacy (version 0) tracking file schema.
pub const LEGACY_KEY_SEPARATOR: &str = "__";

pub fn decode_name(name: &str) -> Cow<'_, str> {
    match percent_decode_str(name).decode_utf8() {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(name),
    }
}

pub fn metadata_key(member_type: &str, name: &str) -> String {
    format!("{member_type}{KEY_SEPARATOR}{}", decode_name(name))
}

pub fn legacy_key(member_type: &str, name: &str) -> String {
    format!("{member_type}{LEGACY_KEY_SEPARATOR}{}", decode_name(name))
}

/// Split a current-schema key into `(type, name)`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}

/// Recover the member name from a legacy key when the member type is known.
pub fn legacy_name<'a>(key: &'a str, member_type: &str) -> Option<&'a str> {
    key.strip_prefix(member_type)?
        .strip_prefix(LEGACY_KEY_SEPARATOR)
}

pub fn keys_match(a: &str, b: &str) -> bool {
    a == b || decode_name(a) == decode_name(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_decoded_names() {
        assert_eq!(
            metadata_key("Layout", "Account%20Layout"),
            "Layout###Account Layout"
        );
        assert_eq!(legacy_key("ApexClass", "Foo"), "ApexClass__Foo");
    }

    #[test]
    fn invalid_escapes_pass_through() {
        assert_eq!(decode_name("100%"), "100%");
        assert_eq!(decode_name("%FF"), "%FF");
    }

    #[test]
    fn legacy_name_strips_only_the_type_prefix() {
        assert_eq!(
            legacy_name("CustomField__Account.Foo__c", "CustomField"),
            Some("Account.Foo__c")
        );
        assert_eq!(legacy_name("ApexClass__Foo", "CustomField"), None);
    }

    #[test]
    fn matching_tolerates_encoding_differences() {
        assert!(keys_match("Layout###Account%20Layout", "Layout###Account Layout"));
        assert!(!keys_match("Layout###A", "Layout###B"));
    }
}
