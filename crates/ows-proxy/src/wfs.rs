//! Attribute-level authorization of WFS feature queries.
//!
//! A query either names the properties it wants, in which case every one of
//! them must be viewable, or names none, in which case the gate narrows it to
//! the geometry plus the viewable attributes before it reaches the renderer.

use access_policy::{local_name, LayerNameIndex, PermissionContext};
use tracing::debug;

use crate::error::GateError;
use crate::gate::{require_layer_flag, QUERY, VIEW};
use crate::request::OwsParams;
use crate::xml::{XmlElement, XmlNode};

/// Property that carries a feature's geometry. It is always returned and
/// needs no attribute flag of its own.
pub const GEOMETRY_PROPERTY: &str = "geometry";

/// Outcome of checking one query's property list.
#[derive(Debug, PartialEq)]
enum Selection {
    /// The requested list is acceptable unchanged.
    Requested,
    /// Nothing was requested; these properties must be asked for instead.
    Narrowed(Vec<String>),
}

fn select_properties(
    perms: &mut PermissionContext<'_>,
    layer_id: &str,
    type_name: &str,
    requested: &[String],
) -> Result<Selection, GateError> {
    if !requested.is_empty() {
        let mut attributes = 0usize;
        for name in requested.iter().map(|n| local_name(n.trim())) {
            if name == GEOMETRY_PROPERTY {
                continue;
            }
            if !perms.attribute_flags(layer_id, name).has(VIEW) {
                return Err(GateError::denied(format!(
                    "attribute '{name}' of layer '{type_name}' lacks '{VIEW}'"
                )));
            }
            attributes += 1;
        }
        if attributes == 0 {
            return Err(GateError::denied(format!(
                "query on layer '{type_name}' selects no attribute"
            )));
        }
        return Ok(Selection::Requested);
    }

    let mut properties = vec![GEOMETRY_PROPERTY.to_string()];
    properties.extend(
        perms
            .attributes_flags(layer_id)
            .iter()
            .filter(|(name, flags)| name.as_str() != GEOMETRY_PROPERTY && flags.has(VIEW))
            .map(|(name, _)| name.clone()),
    );
    if properties.len() == 1 {
        return Err(GateError::denied(format!(
            "layer '{type_name}' has no viewable attribute"
        )));
    }
    Ok(Selection::Narrowed(properties))
}

/// Authorize every `Query` of a `GetFeature` document, in document order.
///
/// Queries without a property list get `PropertyName` elements inserted
/// ahead of their other children. Returns `true` if the document changed.
pub fn authorize_get_feature(
    root: &mut XmlElement,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<bool, GateError> {
    let mut modified = false;
    let mut queries = 0usize;

    for node in root.children.iter_mut() {
        let XmlNode::Element(child) = node else {
            continue;
        };
        // StoredQuery and friends hide the layer behind a server-side id.
        if child.local_name() != "Query" {
            return Err(GateError::denied(format!(
                "GetFeature child '{}' is not supported",
                child.name
            )));
        }
        queries += 1;
        modified |= authorize_query(child, perms, layers)?;
    }

    if queries == 0 {
        return Err(GateError::malformed("GetFeature contains no Query"));
    }
    Ok(modified)
}

fn authorize_query(
    query: &mut XmlElement,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<bool, GateError> {
    let type_name = query
        .attribute("typeName")
        .or_else(|| query.attribute("typeNames"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GateError::malformed("Query without typeName"))?
        .to_string();
    if type_name.contains(|c: char| c == ',' || c.is_whitespace()) {
        return Err(GateError::denied(format!(
            "query joins several layers: '{type_name}'"
        )));
    }

    let layer_id = require_layer_flag(perms, layers, &type_name, QUERY)?;
    let requested: Vec<String> = query
        .elements_named("PropertyName")
        .map(XmlElement::text)
        .collect();

    match select_properties(perms, layer_id, &type_name, &requested)? {
        Selection::Requested => Ok(false),
        Selection::Narrowed(properties) => {
            debug!(layer = %type_name, ?properties, "narrowing query properties");
            let element = match query.prefix() {
                Some(prefix) => format!("{prefix}:PropertyName"),
                None => "PropertyName".to_string(),
            };
            let mut children: Vec<XmlNode> = properties
                .into_iter()
                .map(|p| XmlNode::Element(XmlElement::new(element.as_str()).with_text(p)))
                .collect();
            children.append(&mut query.children);
            query.children = children;
            Ok(true)
        }
    }
}

/// Authorize a key-value `GetFeature` request.
///
/// `TYPENAME` (or `TYPENAMES`) lists the layers; `PROPERTYNAME` is either a
/// plain comma list for a single layer or one parenthesized list per layer.
/// Returns `true` if `PROPERTYNAME` was rewritten.
pub fn authorize_get_feature_kvp(
    params: &mut OwsParams,
    perms: &mut PermissionContext<'_>,
    layers: &LayerNameIndex,
) -> Result<bool, GateError> {
    let type_names: Vec<String> = params
        .get("TYPENAMES")
        .or_else(|| params.get("TYPENAME"))
        .map(split_list)
        .unwrap_or_default();
    if type_names.is_empty() {
        return Err(GateError::denied("GetFeature names no layer"));
    }

    let groups = property_groups(params.get("PROPERTYNAME"), type_names.len())?;
    let mut modified = false;
    let mut selected = Vec::with_capacity(groups.len());

    for (type_name, requested) in type_names.iter().zip(groups) {
        let layer_id = require_layer_flag(perms, layers, type_name, QUERY)?;
        match select_properties(perms, layer_id, type_name, &requested)? {
            Selection::Requested => selected.push(requested),
            Selection::Narrowed(properties) => {
                modified = true;
                selected.push(properties);
            }
        }
    }

    if modified {
        params.set("PROPERTYNAME", format_groups(&selected));
    }
    Ok(modified)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn property_groups(value: Option<&str>, count: usize) -> Result<Vec<Vec<String>>, GateError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Ok(vec![Vec::new(); count]);
    }

    if !value.starts_with('(') {
        if count != 1 {
            return Err(GateError::malformed(
                "PROPERTYNAME must hold one parenthesized list per type name",
            ));
        }
        return Ok(vec![split_list(value)]);
    }

    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| GateError::malformed("unbalanced PROPERTYNAME list"))?;
    let groups: Vec<Vec<String>> = inner.split(")(").map(split_list).collect();
    if groups.len() != count {
        return Err(GateError::malformed(format!(
            "PROPERTYNAME has {} lists for {count} type names",
            groups.len()
        )));
    }
    Ok(groups)
}

fn format_groups(groups: &[Vec<String>]) -> String {
    match groups {
        [single] => single.join(","),
        _ => groups.iter().map(|g| format!("({})", g.join(","))).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{city, guest, staff};
    use crate::xml::XmlDocument;

    fn texts(query: &XmlElement) -> Vec<String> {
        query.elements_named("PropertyName").map(XmlElement::text).collect()
    }

    fn run(body: &str) -> Result<(bool, XmlDocument), GateError> {
        let settings = city();
        let layers = LayerNameIndex::from_settings(&settings.layers);
        let mut perms = staff(&settings);
        let mut doc = XmlDocument::parse(body.as_bytes())?;
        let modified = authorize_get_feature(&mut doc.root, &mut perms, &layers)?;
        Ok((modified, doc))
    }

    #[test]
    fn narrows_query_without_properties() {
        let (modified, doc) = run(
            r#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs">
                 <wfs:Query typeName="ns:roads"><ogc:Filter xmlns:ogc="x"/></wfs:Query>
               </wfs:GetFeature>"#,
        )
        .unwrap();
        assert!(modified);
        let query = doc.root.elements().next().unwrap();
        assert_eq!(texts(query), ["geometry", "name"]);
        let names: Vec<&str> = query.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["wfs:PropertyName", "wfs:PropertyName", "ogc:Filter"]);
    }

    #[test]
    fn unprefixed_query_gets_unprefixed_properties() {
        let (_, doc) = run(r#"<GetFeature><Query typeName="roads"/></GetFeature>"#).unwrap();
        let query = doc.root.elements().next().unwrap();
        assert_eq!(query.elements().next().unwrap().name, "PropertyName");
    }

    #[test]
    fn accepts_viewable_explicit_properties_unchanged() {
        let (modified, doc) = run(
            r#"<GetFeature><Query typeName="roads">
                 <PropertyName>geometry</PropertyName><PropertyName>ns:name</PropertyName>
               </Query></GetFeature>"#,
        )
        .unwrap();
        assert!(!modified);
        assert_eq!(texts(doc.root.elements().next().unwrap()), ["geometry", "ns:name"]);
    }

    #[test]
    fn rejects_non_viewable_property() {
        let err = run(
            r#"<GetFeature><Query typeName="roads">
                 <PropertyName>name</PropertyName><PropertyName>lanes</PropertyName>
               </Query></GetFeature>"#,
        )
        .unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
        assert!(err.detail().contains("lanes"));
    }

    #[test]
    fn rejects_geometry_only_selection() {
        let err = run(
            r#"<GetFeature><Query typeName="roads"><PropertyName>geometry</PropertyName></Query></GetFeature>"#,
        )
        .unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    #[test]
    fn rejects_layer_without_viewable_attributes() {
        // buildings grants query but no attribute flags
        let err = run(r#"<GetFeature><Query typeName="buildings"/></GetFeature>"#).unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    #[test]
    fn rejects_layer_without_query_flag() {
        let err = run(r#"<GetFeature><Query typeName="hidden"/></GetFeature>"#).unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
        let err = run(r#"<GetFeature><Query typeName="nowhere"/></GetFeature>"#).unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    #[test]
    fn later_failure_rejects_whole_document() {
        let err = run(
            r#"<GetFeature><Query typeName="roads"/><Query typeName="buildings"/></GetFeature>"#,
        )
        .unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    #[test]
    fn structural_problems() {
        let err = run(r#"<GetFeature/>"#).unwrap_err();
        assert!(matches!(err, GateError::MalformedRequestBody(_)));
        let err = run(r#"<GetFeature><Query/></GetFeature>"#).unwrap_err();
        assert!(matches!(err, GateError::MalformedRequestBody(_)));
        let err = run(r#"<GetFeature><StoredQuery id="x"/></GetFeature>"#).unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
        let err = run(r#"<GetFeature><Query typeNames="roads parcels"/></GetFeature>"#).unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    #[test]
    fn wfs2_type_names_attribute() {
        let (modified, _) = run(r#"<GetFeature><Query typeNames="ns:roads"/></GetFeature>"#).unwrap();
        assert!(modified);
    }

    #[test]
    fn other_role_applies_to_anonymous_users() {
        let settings = city();
        let layers = LayerNameIndex::from_settings(&settings.layers);
        let mut perms = guest(&settings);
        let mut doc = XmlDocument::parse(br#"<GetFeature><Query typeName="roads"/></GetFeature>"#).unwrap();
        let err = authorize_get_feature(&mut doc.root, &mut perms, &layers).unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    fn run_kvp(query: &str) -> Result<(bool, OwsParams), GateError> {
        let settings = city();
        let layers = LayerNameIndex::from_settings(&settings.layers);
        let mut perms = staff(&settings);
        let mut params = OwsParams::parse(query);
        let modified = authorize_get_feature_kvp(&mut params, &mut perms, &layers)?;
        Ok((modified, params))
    }

    #[test]
    fn kvp_narrows_missing_property_names() {
        let (modified, params) = run_kvp("SERVICE=WFS&REQUEST=GetFeature&TYPENAME=roads").unwrap();
        assert!(modified);
        assert_eq!(params.get("PROPERTYNAME"), Some("geometry,name"));
    }

    #[test]
    fn kvp_accepts_and_rejects_explicit_lists() {
        let (modified, params) =
            run_kvp("SERVICE=WFS&REQUEST=GetFeature&TYPENAME=roads&PROPERTYNAME=name").unwrap();
        assert!(!modified);
        assert_eq!(params.get("propertyname"), Some("name"));

        let err = run_kvp("SERVICE=WFS&REQUEST=GetFeature&TYPENAME=roads&PROPERTYNAME=name,lanes")
            .unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }

    #[test]
    fn kvp_multiple_type_names_use_grouped_lists() {
        let (modified, params) = run_kvp(
            "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=roads,parcels&PROPERTYNAME=(name)()",
        )
        .unwrap();
        assert!(modified);
        assert_eq!(params.get("PROPERTYNAME"), Some("(name)(geometry,area)"));

        let err = run_kvp("SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=roads,parcels&PROPERTYNAME=name")
            .unwrap_err();
        assert!(matches!(err, GateError::MalformedRequestBody(_)));
    }

    #[test]
    fn kvp_without_type_name_is_denied() {
        let err = run_kvp("SERVICE=WFS&REQUEST=GetFeature").unwrap_err();
        assert!(matches!(err, GateError::AuthorizationDenied { .. }));
    }
}
