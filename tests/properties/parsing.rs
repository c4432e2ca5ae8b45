//! Property tests for configuration parsing.

use std::path::Path;

use proptest::prelude::*;

use appforge::{parse_str, ConfigFormat, FieldType};

proptest! {
    /// PROPERTY: the parser never panics, whatever the input.
    #[test]
    fn property_parse_never_panics_yaml(text in "(?s).{0,512}") {
        let _ = parse_str(&text, ConfigFormat::Yaml, Path::new("fuzz.yaml"));
    }

    /// PROPERTY: same for JSON input.
    #[test]
    fn property_parse_never_panics_json(text in "(?s).{0,512}") {
        let _ = parse_str(&text, ConfigFormat::Json, Path::new("fuzz.json"));
    }

    /// PROPERTY: every field type spec round-trips through its display
    /// form.
    #[test]
    fn property_field_type_display_round_trips(
        max_length in 1u32..10_000,
        precision in 1u8..38,
        scale in 0u8..10,
    ) {
        let types = [
            FieldType::String { max_length },
            FieldType::Integer,
            FieldType::Decimal { precision, scale },
            FieldType::Boolean,
            FieldType::DateTime,
        ];
        for ty in types {
            let spec = ty.to_string();
            let parsed: FieldType = spec.parse().expect("display form must parse");
            prop_assert_eq!(parsed, ty);
        }
    }

    /// PROPERTY: a well-formed minimal document always parses, whatever
    /// the (identifier-shaped) names are.
    #[test]
    fn property_minimal_document_parses(
        domain in "[a-z][a-z0-9_]{0,16}",
        entity in "[A-Z][A-Za-z0-9]{0,16}",
        field in "[a-z][a-z0-9_]{0,16}",
    ) {
        let yaml = format!(
            "domain:\n  name: {domain}\n  version: \"1.0\"\nentities:\n  - name: {entity}\n    fields:\n      - name: {field}\n        type: integer\n"
        );
        let parsed = parse_str(&yaml, ConfigFormat::Yaml, Path::new("gen.yaml")).unwrap();
        prop_assert_eq!(parsed.name, domain);
        prop_assert_eq!(parsed.entities[0].name.as_str(), entity.as_str());
        prop_assert!(parsed.entities[0].field(&field).is_some());
    }
}
