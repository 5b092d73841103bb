use access_policy::{LayerNameIndex, PermissionContext};
use tracing::debug;

use crate::error::GateError;
use crate::gate::{require_attribute_flag, require_layer_flag, DELETE, EDIT, INSERT, UPDATE};
use crate::xml::XmlElement;

/// Authorize a WFS `Transaction` document.
///
/// Operations are checked in document order and the first failure rejects
/// the whole transaction. Only `Update`, `Insert` and `Delete` are accepted.
pub fn authorize_transaction(
    root: &XmlElement,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<(), GateError> {
    let mut operations = 0usize;

    for operation in root.elements() {
        operations += 1;
        match operation.local_name() {
            "Update" => authorize_update(operation, perms, layers)?,
            "Insert" => authorize_insert(operation, perms, layers)?,
            "Delete" => authorize_delete(operation, perms, layers)?,
            other => {
                return Err(GateError::denied(format!(
                    "transaction operation '{other}' is not permitted"
                )))
            }
        }
    }

    if operations == 0 {
        return Err(GateError::malformed("transaction contains no operation"));
    }
    debug!(operations, "transaction authorized");
    Ok(())
}

fn type_name(operation: &XmlElement) -> Result<&str, GateError> {
    operation
        .attribute("typeName")
        .or_else(|| operation.attribute("typeNames"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            GateError::malformed(format!("{} without typeName", operation.local_name()))
        })
}

fn authorize_update(
    operation: &XmlElement,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<(), GateError> {
    let type_name = type_name(operation)?;
    let layer_id = require_layer_flag(perms, layers, type_name, UPDATE)?;

    for property in operation.elements_named("Property") {
        // WFS 1.x uses Name, WFS 2 uses ValueReference
        let name = property
            .elements()
            .find(|e| matches!(e.local_name(), "Name" | "ValueReference"))
            .map(XmlElement::text)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GateError::malformed("Update property without a name"))?;
        require_attribute_flag(perms, layer_id, type_name, &name, EDIT)?;
    }
    Ok(())
}

fn authorize_insert(
    operation: &XmlElement,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<(), GateError> {
    let mut features = 0usize;
    for feature in operation.elements() {
        features += 1;
        let type_name = feature.local_name();
        let layer_id = require_layer_flag(perms, layers, type_name, INSERT)?;
        for property in feature.elements() {
            require_attribute_flag(perms, layer_id, type_name, property.local_name(), EDIT)?;
        }
    }
    if features == 0 {
        return Err(GateError::malformed("Insert without features"));
    }
    Ok(())
}

fn authorize_delete(
    operation: &XmlElement,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<(), GateError> {
    let type_name = type_name(operation)?;
    require_layer_flag(perms, layers, type_name, DELETE)?;
    Ok(())
}
