use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::flags::Flags;
use crate::layers::UNKNOWN_LAYER_ID;
use crate::resolver::{resolve_roles, RequestUser};
use crate::schema::AccessRole;

/// Effective permissions of one user for one request.
///
/// Holds the applicable roles and memoizes the per-layer unions computed
/// from them. A context must never outlive the request that created it, and
/// must never be handed to another request.
#[derive(Debug)]
pub struct PermissionContext<'a> {
    roles: Vec<&'a AccessRole>,
    layer_cache: HashMap<String, Flags>,
    attribute_cache: HashMap<String, BTreeMap<String, Flags>>,
    topics: Option<BTreeSet<String>>,
}

impl<'a> PermissionContext<'a> {
    /// Resolve the roles applicable to `user` and start with empty caches.
    pub fn new(user: &RequestUser, roles: &'a [AccessRole]) -> Self {
        Self::from_roles(resolve_roles(user, roles))
    }

    pub fn from_roles(roles: Vec<&'a AccessRole>) -> Self {
        Self {
            roles,
            layer_cache: HashMap::new(),
            attribute_cache: HashMap::new(),
            topics: None,
        }
    }

    /// Whether at least one role applied to the user.
    pub fn has_roles(&self) -> bool {
        !self.roles.is_empty()
    }

    /// Names of the applicable roles, in resolution order.
    pub fn role_names(&self) -> Vec<&str> {
        self.roles.iter().map(|r| r.name.as_str()).collect()
    }

    /// Union of the applicable roles' flags on `layer_id`.
    pub fn layer_flags(&mut self, layer_id: &str) -> &Flags {
        if !self.layer_cache.contains_key(layer_id) {
            let flags = compute_layer_flags(&self.roles, layer_id);
            self.layer_cache.insert(layer_id.to_string(), flags);
        }
        &self.layer_cache[layer_id]
    }

    /// Per-attribute union of the applicable roles' flags on `layer_id`.
    pub fn attributes_flags(&mut self, layer_id: &str) -> &BTreeMap<String, Flags> {
        if !self.attribute_cache.contains_key(layer_id) {
            let flags = compute_attributes_flags(&self.roles, layer_id);
            self.attribute_cache.insert(layer_id.to_string(), flags);
        }
        &self.attribute_cache[layer_id]
    }

    /// Flags of a single attribute; empty when no role mentions it.
    pub fn attribute_flags(&mut self, layer_id: &str, attribute: &str) -> Flags {
        self.attributes_flags(layer_id)
            .get(attribute)
            .cloned()
            .unwrap_or_default()
    }

    /// Union of the applicable roles' topics.
    pub fn user_topics(&mut self) -> &BTreeSet<String> {
        let roles = &self.roles;
        self.topics.get_or_insert_with(|| {
            roles
                .iter()
                .flat_map(|r| r.topics.iter().cloned())
                .collect()
        })
    }
}

fn compute_layer_flags(roles: &[&AccessRole], layer_id: &str) -> Flags {
    if layer_id == UNKNOWN_LAYER_ID {
        return Flags::new();
    }
    roles
        .iter()
        .filter_map(|r| r.layers.get(layer_id))
        .fold(Flags::new(), |acc, flags| acc.union(flags))
}

fn compute_attributes_flags(roles: &[&AccessRole], layer_id: &str) -> BTreeMap<String, Flags> {
    let mut merged: BTreeMap<String, Flags> = BTreeMap::new();
    if layer_id == UNKNOWN_LAYER_ID {
        return merged;
    }
    for attrs in roles.iter().filter_map(|r| r.attributes.get(layer_id)) {
        for (name, flags) in attrs {
            let entry = merged.entry(name.clone()).or_default();
            *entry = entry.union(flags);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AuthMode;

    fn role(name: &str, auth: AuthMode) -> AccessRole {
        AccessRole {
            name: name.to_string(),
            auth,
            users: Default::default(),
            layers: Default::default(),
            attributes: Default::default(),
            topics: Default::default(),
        }
    }

    fn two_roles() -> Vec<AccessRole> {
        let mut viewers = role("viewers", AuthMode::All);
        viewers.layers.insert("roads".into(), Flags::from(["view"]));
        viewers
            .attributes
            .entry("roads".into())
            .or_default()
            .insert("name".into(), Flags::from(["view"]));
        viewers.topics.insert("base".into());

        let mut editors = role("editors", AuthMode::Authenticated);
        editors.layers.insert("roads".into(), Flags::from(["query", "update"]));
        editors.layers.insert("parcels".into(), Flags::from(["view"]));
        let attrs = editors.attributes.entry("roads".into()).or_default();
        attrs.insert("name".into(), Flags::from(["edit"]));
        attrs.insert("lanes".into(), Flags::from(["view"]));
        editors.topics.insert("editing".into());
        editors.topics.insert("base".into());

        vec![viewers, editors]
    }

    #[test]
    fn layer_flags_union_over_roles() {
        let roles = two_roles();
        let mut ctx = PermissionContext::new(&RequestUser::authenticated("alice"), &roles);
        let flags = ctx.layer_flags("roads").clone();
        assert_eq!(flags, Flags::from(["view", "query", "update"]));
        assert!(ctx.layer_flags("parcels").has("view"));
        assert!(ctx.layer_flags("missing").is_empty());
    }

    #[test]
    fn layer_flags_are_cache_consistent() {
        let roles = two_roles();
        let mut ctx = PermissionContext::new(&RequestUser::authenticated("alice"), &roles);
        let first = ctx.layer_flags("roads").clone();
        let second = ctx.layer_flags("roads").clone();
        assert_eq!(first, second);

        let applicable: Vec<&AccessRole> = roles.iter().collect();
        assert_eq!(first, compute_layer_flags(&applicable, "roads"));
    }

    #[test]
    fn attribute_flags_union_per_attribute() {
        let roles = two_roles();
        let mut ctx = PermissionContext::new(&RequestUser::authenticated("alice"), &roles);
        let attrs = ctx.attributes_flags("roads").clone();
        assert_eq!(attrs["name"], Flags::from(["view", "edit"]));
        assert_eq!(attrs["lanes"], Flags::from(["view"]));
        assert!(ctx.attribute_flags("roads", "speed").is_empty());
        assert!(ctx.attributes_flags("parcels").is_empty());
    }

    #[test]
    fn anonymous_user_only_gets_matching_roles() {
        let roles = two_roles();
        let mut ctx = PermissionContext::new(&RequestUser::anonymous(), &roles);
        assert_eq!(ctx.role_names(), ["viewers"]);
        assert_eq!(ctx.layer_flags("roads").clone(), Flags::from(["view"]));
        assert!(ctx.attribute_flags("roads", "lanes").is_empty());
    }

    #[test]
    fn topics_are_unioned() {
        let roles = two_roles();
        let mut ctx = PermissionContext::new(&RequestUser::authenticated("alice"), &roles);
        let topics: Vec<&str> = ctx.user_topics().iter().map(String::as_str).collect();
        assert_eq!(topics, ["base", "editing"]);
    }

    #[test]
    fn no_roles_means_empty_flags_everywhere() {
        let mut ctx = PermissionContext::from_roles(Vec::new());
        assert!(!ctx.has_roles());
        assert!(ctx.layer_flags("roads").is_empty());
        assert!(ctx.attributes_flags("roads").is_empty());
        assert!(ctx.user_topics().is_empty());
    }

    #[test]
    fn unknown_layer_sentinel_is_always_empty() {
        let mut roles = two_roles();
        roles[0]
            .layers
            .insert(UNKNOWN_LAYER_ID.to_string(), Flags::from(["view"]));
        let mut ctx = PermissionContext::new(&RequestUser::authenticated("alice"), &roles);
        assert!(ctx.layer_flags(UNKNOWN_LAYER_ID).is_empty());
    }
}
