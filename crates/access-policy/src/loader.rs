use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::layers::{EXCLUDED, UNKNOWN_LAYER_ID};
use crate::schema::{AuthMode, ProjectSettings};

/// Load [`ProjectSettings`] from a YAML file on disk.
///
/// Validates the settings after deserialization (unique role names, layer
/// IDs, published layer names, user lists).
pub fn load_settings(path: impl AsRef<Path>) -> Result<ProjectSettings> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read project settings: {}", path.display()))?;
    load_settings_from_str(&contents)
        .with_context(|| format!("failed to parse project settings: {}", path.display()))
}

/// Parse and validate [`ProjectSettings`] from a YAML string.
pub fn load_settings_from_str(yaml: &str) -> Result<ProjectSettings> {
    let settings: ProjectSettings =
        serde_yml::from_str(yaml).context("YAML deserialization failed")?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &ProjectSettings) -> Result<()> {
    if settings.project_file.trim().is_empty() {
        bail!("project_file must not be empty");
    }
    if settings.project_file.contains('/') || settings.project_file.contains("..") {
        bail!(
            "project_file '{}' must be a plain file name",
            settings.project_file
        );
    }

    let mut published = HashMap::new();
    for (id, layer) in &settings.layers {
        if id == UNKNOWN_LAYER_ID {
            bail!("layer ID must not be empty");
        }
        if layer.flags.has(EXCLUDED) {
            continue;
        }
        if let Some(other) = published.insert(layer.name.as_str(), id.as_str()) {
            bail!(
                "layers '{}' and '{}' are both published as '{}'",
                other,
                id,
                layer.name
            );
        }
    }

    let mut seen = HashSet::new();
    for role in &settings.roles {
        if role.name.is_empty() {
            bail!("role name must not be empty");
        }
        if !seen.insert(&role.name) {
            bail!("duplicate role name: '{}'", role.name);
        }
        if role.auth == AuthMode::Users && role.users.is_empty() {
            bail!("role '{}' uses auth 'users' but lists no users", role.name);
        }
        let referenced = role.layers.keys().chain(role.attributes.keys());
        for id in referenced {
            if id == UNKNOWN_LAYER_ID {
                bail!("role '{}' references an empty layer ID", role.name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_minimal_settings() {
        let settings = load_settings_from_str("project_file: \"roads.qgs\"\n").unwrap();
        assert_eq!(settings.project_file, "roads.qgs");
        assert!(settings.roles.is_empty());
    }

    #[test]
    fn reject_duplicate_role_names() {
        let yaml = r#"
project_file: "roads.qgs"
roles:
  - name: "dup"
    auth: all
  - name: "dup"
    auth: other
"#;
        let err = load_settings_from_str(yaml).unwrap_err();
        assert!(
            err.to_string().contains("duplicate role name"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn reject_empty_role_name() {
        let yaml = r#"
project_file: "roads.qgs"
roles:
  - name: ""
    auth: all
"#;
        let err = load_settings_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("must not be empty"), "unexpected error: {err}");
    }

    #[test]
    fn reject_users_role_without_users() {
        let yaml = r#"
project_file: "roads.qgs"
roles:
  - name: "editors"
    auth: users
"#;
        let err = load_settings_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("lists no users"), "unexpected error: {err}");
    }

    #[test]
    fn reject_empty_layer_ids() {
        let yaml = r#"
project_file: "roads.qgs"
roles:
  - name: "sneaky"
    auth: all
    layers:
      "": [view]
"#;
        let err = load_settings_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("empty layer ID"), "unexpected error: {err}");

        let yaml = r#"
project_file: "roads.qgs"
layers:
  "":
    name: roads
"#;
        assert!(load_settings_from_str(yaml).is_err());
    }

    #[test]
    fn reject_layers_sharing_a_published_name() {
        let yaml = r#"
project_file: "roads.qgs"
layers:
  a_1:
    name: roads
  b_1:
    name: roads
roles:
  - name: "viewers"
    auth: all
    layers:
      a_1: [view]
"#;
        let err = load_settings_from_str(yaml).unwrap_err();
        assert!(
            err.to_string().contains("both published as 'roads'"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn excluded_layer_may_share_a_name() {
        let yaml = r#"
project_file: "roads.qgs"
layers:
  a_1:
    name: roads
  b_1:
    name: roads
    flags: [excluded]
"#;
        let settings = load_settings_from_str(yaml).unwrap();
        assert_eq!(settings.layers.len(), 2);
    }

    #[test]
    fn reject_project_file_with_path() {
        let err = load_settings_from_str("project_file: \"../other/x.qgs\"\n").unwrap_err();
        assert!(err.to_string().contains("plain file name"), "unexpected error: {err}");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "project_file: \"city.qgs\"").unwrap();
        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.project_file, "city.qgs");
    }

    #[test]
    fn load_from_nonexistent_file() {
        let err = load_settings("/does/not/exist.yaml").unwrap_err();
        assert!(
            err.to_string().contains("failed to read project settings"),
            "unexpected error: {err}"
        );
    }
}
