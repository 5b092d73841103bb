use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::flags::Flags;

/// Per-project access document, loaded from the project's `access.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// File name of the project inside its directory (e.g. `roads.qgs`).
    pub project_file: String,
    /// Project-wide default used when no roles are defined.
    #[serde(default)]
    pub access: ProjectAccess,
    /// Published layers keyed by their stable internal layer ID.
    #[serde(default)]
    pub layers: BTreeMap<String, LayerSettings>,
    /// Ordered role list. Empty means the role gate is not engaged.
    #[serde(default)]
    pub roles: Vec<AccessRole>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectAccess {
    #[serde(default)]
    pub mode: AccessMode,
    /// Only consulted for [`AccessMode::Users`].
    #[serde(default)]
    pub users: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Public,
    Authenticated,
    Users,
    #[default]
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSettings {
    /// Public layer name, as used in `LAYERS` and `typeName`.
    pub name: String,
    /// Publishing flags (`hidden`, `excluded`, ...), independent of roles.
    #[serde(default)]
    pub flags: Flags,
}

/// A rule binding a user-matching predicate to layer and attribute flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRole {
    pub name: String,
    pub auth: AuthMode,
    /// Only consulted for [`AuthMode::Users`].
    #[serde(default)]
    pub users: BTreeSet<String>,
    /// Layer ID -> permission flags.
    #[serde(default)]
    pub layers: BTreeMap<String, Flags>,
    /// Layer ID -> attribute name -> permission flags.
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeMap<String, Flags>>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Every user.
    All,
    /// Any signed-in user.
    Authenticated,
    /// Only users without a session.
    Anonymous,
    /// Signed-in users named in the role's `users` list.
    Users,
    /// Fallback: applies only when no other role matched.
    Other,
}

/// Public components of the internal project-file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub owner: String,
    pub name: String,
    pub project_file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_settings() {
        let yaml = r#"
project_file: "roads.qgs"
"#;
        let settings: ProjectSettings = serde_yml::from_str(yaml).unwrap();
        assert_eq!(settings.project_file, "roads.qgs");
        assert_eq!(settings.access.mode, AccessMode::Private);
        assert!(settings.layers.is_empty());
        assert!(settings.roles.is_empty());
    }

    #[test]
    fn deserialize_full_settings() {
        let yaml = r#"
project_file: "city.qgs"
access:
  mode: users
  users: [alice, bob]
layers:
  roads_8f2e:
    name: roads
  buildings_11aa:
    name: buildings
    flags: [hidden]
roles:
  - name: editors
    auth: users
    users: [alice]
    layers:
      roads_8f2e: [view, query, update]
    attributes:
      roads_8f2e:
        name: [view, edit]
        lanes: [view]
    topics: [traffic]
  - name: guests
    auth: other
    layers:
      roads_8f2e: [view]
"#;
        let settings: ProjectSettings = serde_yml::from_str(yaml).unwrap();
        assert_eq!(settings.access.mode, AccessMode::Users);
        assert!(settings.access.users.contains("bob"));
        assert_eq!(settings.layers["roads_8f2e"].name, "roads");
        assert!(settings.layers["buildings_11aa"].flags.has("hidden"));
        assert_eq!(settings.roles.len(), 2);

        let editors = &settings.roles[0];
        assert_eq!(editors.auth, AuthMode::Users);
        assert!(editors.users.contains("alice"));
        assert!(editors.layers["roads_8f2e"].has("update"));
        assert!(editors.attributes["roads_8f2e"]["name"].has("edit"));
        assert!(editors.topics.contains("traffic"));

        assert_eq!(settings.roles[1].auth, AuthMode::Other);
    }

    #[test]
    fn unknown_auth_mode_is_rejected() {
        let yaml = r#"
project_file: "city.qgs"
roles:
  - name: admins
    auth: superuser
"#;
        assert!(serde_yml::from_str::<ProjectSettings>(yaml).is_err());
    }
}
