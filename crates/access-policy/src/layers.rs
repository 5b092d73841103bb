use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::schema::LayerSettings;

/// Sentinel returned for names that do not map to a published layer.
///
/// Layer IDs are validated to be non-empty on load, so no role can grant
/// flags on this ID.
pub const UNKNOWN_LAYER_ID: &str = "";

/// Layer flag that withdraws a layer from publishing altogether.
pub(crate) const EXCLUDED: &str = "excluded";

/// Maps public layer names to internal layer IDs.
#[derive(Debug, Clone, Default)]
pub struct LayerNameIndex {
    by_name: HashMap<String, String>,
}

impl LayerNameIndex {
    /// Invert the project's `layer ID -> settings` map. Excluded layers are
    /// left out and therefore resolve to [`UNKNOWN_LAYER_ID`], as does a name
    /// shared by several published layers.
    pub fn from_settings(layers: &BTreeMap<String, LayerSettings>) -> Self {
        let mut by_name = HashMap::with_capacity(layers.len());
        for (id, layer) in layers {
            if layer.flags.has(EXCLUDED) {
                debug!(layer = %layer.name, "skipping excluded layer");
                continue;
            }
            if let Some(previous) = by_name.insert(layer.name.clone(), id.clone()) {
                warn!(layer = %layer.name, first = %previous, second = %id, "ambiguous layer name");
                by_name.insert(layer.name.clone(), UNKNOWN_LAYER_ID.to_string());
            }
        }
        Self { by_name }
    }

    /// Resolve a layer name or a namespace-qualified `typeName`.
    ///
    /// Only the part after the last `:` is significant, so
    /// `"workspace:roads"` and `"roads"` resolve to the same ID.
    pub fn resolve(&self, type_name: &str) -> &str {
        let local = local_name(type_name);
        self.by_name
            .get(local)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LAYER_ID)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// The substring after the last `:` (the whole string if there is none).
pub fn local_name(qualified: &str) -> &str {
    match qualified.rfind(':') {
        Some(pos) => &qualified[pos + 1..],
        None => qualified,
    }
}
