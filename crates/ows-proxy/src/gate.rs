use access_policy::{local_name, LayerNameIndex, PermissionContext};
use tracing::debug;

use crate::error::GateError;
use crate::request::{OwsOperation, OwsParams, OwsRequest};
use crate::transaction::authorize_transaction;
use crate::wfs::{authorize_get_feature, authorize_get_feature_kvp};
use crate::xml::XmlDocument;

pub const VIEW: &str = "view";
pub const QUERY: &str = "query";
pub const INSERT: &str = "insert";
pub const UPDATE: &str = "update";
pub const DELETE: &str = "delete";
pub const EDIT: &str = "edit";

/// What the gate decided about a request it let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    /// Operation, refined from the body's root element for WFS POSTs.
    pub operation: OwsOperation,
    /// Whether parameters or body were narrowed before forwarding.
    pub rewritten: bool,
}

/// Check `layer` for `flag` and return its internal ID.
pub(crate) fn require_layer_flag<'l>(
    perms: &mut PermissionContext<'_>,
    layers: &'l LayerNameIndex,
    layer: &str,
    flag: &str,
) -> Result<&'l str, GateError> {
    let layer_id = layers.resolve(layer);
    if perms.layer_flags(layer_id).has(flag) {
        Ok(layer_id)
    } else {
        Err(GateError::denied(format!("layer '{layer}' lacks '{flag}'")))
    }
}

pub(crate) fn require_attribute_flag(
    perms: &mut PermissionContext<'_>,
    layer_id: &str,
    layer: &str,
    attribute: &str,
    flag: &str,
) -> Result<(), GateError> {
    let attribute = local_name(attribute.trim());
    if perms.attribute_flags(layer_id, attribute).has(flag) {
        Ok(())
    } else {
        Err(GateError::denied(format!(
            "attribute '{attribute}' of layer '{layer}' lacks '{flag}'"
        )))
    }
}

/// Parameters the gate decides on, which must therefore carry exactly one
/// value. Names in one group are aliases of each other.
const SINGLE_VALUED: &[&[&str]] = &[
    &["SERVICE"],
    &["REQUEST"],
    &["LAYERS"],
    &["QUERY_LAYERS"],
    &["TYPENAME", "TYPENAMES"],
    &["PROPERTYNAME"],
    &["SLD"],
    &["SLD_BODY"],
];

/// Authorize a buffered request and narrow it where needed.
///
/// `perms` is `None` when the project defines no roles; requests are then
/// classified but not checked. On success the request may carry rewritten
/// parameters or a new body with a matching `Content-Length`. On failure
/// nothing about the request may be forwarded.
///
/// Under roles, a non-empty body is inspected as a WFS document whatever
/// the parameters claim; the renderer takes the operation of a posted
/// document from its root element.
pub fn inspect_request(
    req: &mut OwsRequest,
    perms: Option<&mut PermissionContext<'_>>,
    layers: &LayerNameIndex,
) -> Result<Inspection, GateError> {
    reject_repeated(&req.params)?;
    let operation = OwsOperation::classify(&req.method, &req.params);
    debug!(operation = operation.as_str(), method = %req.method, "request classified");

    let Some(perms) = perms else {
        return Ok(Inspection {
            operation,
            rewritten: false,
        });
    };

    let inspection = inspect_parameters(req, operation, perms, layers)?;
    if req.body.is_empty() || operation.is_document() {
        return Ok(inspection);
    }

    let document = inspect_wfs_document(req, perms, layers)?;
    Ok(Inspection {
        operation: match document.operation {
            OwsOperation::PassThrough => inspection.operation,
            refined => refined,
        },
        rewritten: inspection.rewritten || document.rewritten,
    })
}

fn reject_repeated(params: &OwsParams) -> Result<(), GateError> {
    for group in SINGLE_VALUED {
        let occurrences: usize = group.iter().map(|name| params.count(name)).sum();
        if occurrences > 1 {
            return Err(GateError::denied(format!(
                "parameter '{}' given more than once",
                group.join("/")
            )));
        }
    }
    Ok(())
}

fn reject_client_style(params: &OwsParams) -> Result<(), GateError> {
    // a client-side style document could name any layer
    if params.contains("SLD") || params.contains("SLD_BODY") {
        return Err(GateError::denied("client-supplied SLD"));
    }
    Ok(())
}

fn inspect_parameters(
    req: &mut OwsRequest,
    operation: OwsOperation,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<Inspection, GateError> {
    match operation {
        OwsOperation::GetCapabilities | OwsOperation::PassThrough => Ok(Inspection {
            operation,
            rewritten: false,
        }),
        OwsOperation::GetMap => {
            reject_client_style(&req.params)?;
            require_all(perms, layers, req.params.get("LAYERS"), VIEW)?;
            Ok(Inspection {
                operation,
                rewritten: false,
            })
        }
        OwsOperation::GetPrint => {
            reject_client_style(&req.params)?;
            require_all(perms, layers, req.params.get("LAYERS"), VIEW)?;
            // per-map layer lists of a print layout, e.g. map0:LAYERS
            let map_layers: Vec<String> = req
                .params
                .matching(|name| {
                    name.len() > ":LAYERS".len()
                        && name.to_ascii_uppercase().ends_with(":LAYERS")
                })
                .map(|(_, value)| value.to_string())
                .collect();
            for value in &map_layers {
                require_all(perms, layers, Some(value.as_str()), VIEW)?;
            }
            Ok(Inspection {
                operation,
                rewritten: false,
            })
        }
        OwsOperation::GetFeatureInfo => {
            reject_client_style(&req.params)?;
            require_all(perms, layers, req.params.get("QUERY_LAYERS"), QUERY)?;
            require_all(perms, layers, req.params.get("LAYERS"), VIEW)?;
            Ok(Inspection {
                operation,
                rewritten: false,
            })
        }
        OwsOperation::GetFeatureKvp => {
            let rewritten = authorize_get_feature_kvp(&mut req.params, perms, layers)?;
            Ok(Inspection {
                operation,
                rewritten,
            })
        }
        OwsOperation::TransactionKvp => Err(GateError::denied(
            "transactions are only accepted as XML documents",
        )),
        OwsOperation::WfsDocument | OwsOperation::GetFeature | OwsOperation::Transaction => {
            inspect_wfs_document(req, perms, layers)
        }
    }
}

fn require_all(
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
    list: Option<&str>,
    flag: &str,
) -> Result<(), GateError> {
    for layer in list
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        require_layer_flag(perms, layers, layer, flag)?;
    }
    Ok(())
}

fn inspect_wfs_document(
    req: &mut OwsRequest,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<Inspection, GateError> {
    let mut doc = XmlDocument::parse(&req.body)?;
    let root = doc.root.local_name().to_string();

    match root.as_str() {
        "GetFeature" => {
            let rewritten = authorize_get_feature(&mut doc.root, perms, layers)?;
            if rewritten {
                req.replace_body(doc.to_bytes()?);
            }
            Ok(Inspection {
                operation: OwsOperation::GetFeature,
                rewritten,
            })
        }
        "Transaction" => {
            authorize_transaction(&doc.root, perms, layers)?;
            Ok(Inspection {
                operation: OwsOperation::Transaction,
                rewritten: false,
            })
        }
        other => {
            debug!(root = other, "WFS document passes through");
            Ok(Inspection {
                operation: OwsOperation::PassThrough,
                rewritten: false,
            })
        }
    }
}
