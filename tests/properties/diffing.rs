//! Property tests for configuration diffing.

use proptest::prelude::*;

use appforge::generate::diff_domains;
use appforge::model::{DomainConfig, EntityConfig, FieldConfig, FieldType};

fn entity_strategy() -> impl Strategy<Value = EntityConfig> {
    (
        "[A-Z][A-Za-z0-9]{0,12}",
        proptest::collection::vec("[a-z][a-z0-9_]{0,12}", 1..6),
    )
        .prop_map(|(name, mut field_names)| {
            field_names.sort();
            field_names.dedup();
            EntityConfig {
                storage_name: format!("{}s", name.to_lowercase()),
                fields: field_names
                    .into_iter()
                    .map(|f| FieldConfig::new(f, FieldType::Integer))
                    .collect(),
                name,
            }
        })
}

fn domain_strategy() -> impl Strategy<Value = DomainConfig> {
    proptest::collection::vec(entity_strategy(), 0..6).prop_map(|mut entities| {
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        entities.dedup_by(|a, b| a.name == b.name);
        DomainConfig {
            name: "generated".to_string(),
            version: "1.0".to_string(),
            entities,
            relationships: vec![],
            workflows: vec![],
            api_endpoints: vec![],
            ui_components: vec![],
            integrations: vec![],
            business_rules: vec![],
            roles: vec![],
        }
    })
}

proptest! {
    /// PROPERTY: diffing a configuration against itself is empty.
    #[test]
    fn property_diff_reflexive(domain in domain_strategy()) {
        let diff = diff_domains(&domain, &domain);
        prop_assert!(diff.is_empty());
        prop_assert!(diff.affected_entities(&domain).is_empty());
    }

    /// PROPERTY: adding a field to any entity yields a diff naming exactly
    /// that entity as modified and affected.
    #[test]
    fn property_field_addition_is_localized(
        domain in domain_strategy(),
        index in any::<prop::sample::Index>(),
    ) {
        prop_assume!(!domain.entities.is_empty());

        let mut changed = domain.clone();
        let i = index.index(changed.entities.len());
        changed.entities[i]
            .fields
            .push(FieldConfig::new("zz_added_field", FieldType::Boolean));
        let target = changed.entities[i].name.clone();

        let diff = diff_domains(&domain, &changed);
        prop_assert!(!diff.is_empty());
        prop_assert_eq!(diff.added_entities.len(), 0);
        prop_assert_eq!(diff.modified_entities.len(), 1);
        prop_assert_eq!(&diff.modified_entities[0].entity, &target);
        prop_assert_eq!(diff.affected_entities(&changed), vec![target]);
    }

    /// PROPERTY: entity addition and removal are symmetric.
    #[test]
    fn property_diff_symmetry(a in domain_strategy(), b in domain_strategy()) {
        let forward = diff_domains(&a, &b);
        let backward = diff_domains(&b, &a);
        prop_assert_eq!(forward.added_entities, backward.removed_entities);
        prop_assert_eq!(forward.removed_entities, backward.added_entities);
        prop_assert_eq!(forward.relationships_changed, backward.relationships_changed);
    }
}
