//! Property tests for output formatting and naming helpers.

use proptest::prelude::*;

use appforge::engine::format_output;
use appforge::hash::hash_bytes;
use appforge::model::{pluralize, to_pascal_case, to_snake_case};

proptest! {
    /// PROPERTY: formatting is idempotent.
    #[test]
    fn property_format_output_idempotent(text in "(?s).{0,512}") {
        let once = format_output(&text);
        let twice = format_output(&once);
        prop_assert_eq!(once, twice);
    }

    /// PROPERTY: formatted output always ends in exactly one newline and
    /// carries no trailing whitespace on any line.
    #[test]
    fn property_format_output_normalized(text in "(?s).{0,512}") {
        let formatted = format_output(&text);
        prop_assert!(formatted.ends_with('\n'));
        prop_assert!(!formatted.ends_with("\n\n"));
        for line in formatted.lines() {
            prop_assert_eq!(line, line.trim_end());
        }
    }

    /// PROPERTY: identical bytes hash identically, and the digest always
    /// carries the algorithm prefix.
    #[test]
    fn property_hash_bytes_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let a = hash_bytes(&bytes);
        let b = hash_bytes(&bytes);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.starts_with("sha256:"));
        prop_assert_eq!(a.len(), "sha256:".len() + 64);
    }

    /// PROPERTY: snake_case output never contains uppercase characters.
    #[test]
    fn property_snake_case_is_lowercase(name in "[A-Za-z][A-Za-z0-9_]{0,24}") {
        let snake = to_snake_case(&name);
        prop_assert!(!snake.chars().any(|c| c.is_ascii_uppercase()));
    }

    /// PROPERTY: pascal_case never emits underscores and never panics.
    #[test]
    fn property_pascal_case_no_underscores(name in "[A-Za-z][A-Za-z0-9_]{0,24}") {
        let pascal = to_pascal_case(&name);
        prop_assert!(!pascal.contains('_'));
    }

    /// PROPERTY: pluralizing a non-empty name yields a longer non-empty name.
    #[test]
    fn property_pluralize_nonempty(name in "[a-z]{1,16}") {
        let plural = pluralize(&name);
        prop_assert!(!plural.is_empty());
        prop_assert!(plural.len() >= name.len());
    }
}
