//! Shared fixtures for appforge integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A small but representative rental-management domain.
pub const RENTAL_CONFIG: &str = r#"
domain:
  name: property_mgmt
  version: "1.0"
roles:
  - admin
  - manager
entities:
  - name: Property
    fields:
      - name: id
        type: integer
        required: true
        unique: true
      - name: address
        type: string(255)
        required: true
      - name: rent
        type: decimal(10,2)
        required: true
      - name: status
        type: enum(vacant,occupied,maintenance)
        default: vacant
  - name: Tenant
    fields:
      - name: id
        type: integer
        required: true
        unique: true
      - name: name
        type: string(120)
        required: true
      - name: email
        type: string(255)
        unique: true
        indexed: true
      - name: property_id
        type: foreign-key(Property)
        required: true
relationships:
  - source_entity: Property
    target_entity: Tenant
    cardinality: one-to-many
    source_navigation: tenants
    target_navigation: property
workflows:
  - name: notify_on_vacancy
    trigger: status_change
    steps:
      - name: flag_property
        entity: Property
        field: status
        action: set
api_endpoints:
  - path: /properties
    method: GET
    entity: Property
    permissions:
      - admin
      - manager
"#;

/// Same domain with the rent precision widened (modifies Property only).
pub const RENTAL_CONFIG_WIDER_RENT: &str = r#"
domain:
  name: property_mgmt
  version: "1.0"
roles:
  - admin
  - manager
entities:
  - name: Property
    fields:
      - name: id
        type: integer
        required: true
        unique: true
      - name: address
        type: string(255)
        required: true
      - name: rent
        type: decimal(12,2)
        required: true
      - name: status
        type: enum(vacant,occupied,maintenance)
        default: vacant
  - name: Tenant
    fields:
      - name: id
        type: integer
        required: true
        unique: true
      - name: name
        type: string(120)
        required: true
      - name: email
        type: string(255)
        unique: true
        indexed: true
      - name: property_id
        type: foreign-key(Property)
        required: true
relationships:
  - source_entity: Property
    target_entity: Tenant
    cardinality: one-to-many
    source_navigation: tenants
    target_navigation: property
workflows:
  - name: notify_on_vacancy
    trigger: status_change
    steps:
      - name: flag_property
        entity: Property
        field: status
        action: set
api_endpoints:
  - path: /properties
    method: GET
    entity: Property
    permissions:
      - admin
      - manager
"#;

/// Isolated workspace: a temp dir holding the config file and output root.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp workspace"),
        }
    }

    pub fn write_config(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).expect("write config");
        path
    }

    pub fn output_root(&self) -> PathBuf {
        self.dir.path().join("generated")
    }

    pub fn read_output(&self, relative: &str) -> String {
        let path = self.output_root().join(relative);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {}: {}", path.display(), e))
    }

    pub fn output_exists(&self, relative: &str) -> bool {
        self.output_root().join(relative).exists()
    }
}

/// Write a template override directory containing the given
/// `<name>.<kind>.hbs` sources.
pub fn write_template_dir(root: &Path, templates: &[(&str, &str)]) -> PathBuf {
    let dir = root.join("templates");
    fs::create_dir_all(&dir).expect("template dir");
    for (filename, source) in templates {
        fs::write(dir.join(filename), source).expect("write template");
    }
    dir
}
