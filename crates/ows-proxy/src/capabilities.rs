//! Rewrites renderer URLs in WMS and WFS capability documents.
//!
//! The renderer advertises its own address, with the internal project path
//! in a `MAP` parameter, in every `xlink:href`. WFS 1.0 documents use an
//! `onlineResource` attribute or `<OnlineResource>` text instead. Clients
//! must be sent back to the gate, and the project path must not leak.

use regex::Regex;
use tracing::debug;
use url::Url;

const HREF_PATTERN: &str = r#"(?:(?:xlink:href|onlineResource)="|<OnlineResource>)(https?://[^"<]*?(?:\?|&amp;|&)(?i:map)=[^"<]*)"#;

pub struct CapabilitiesRewriter {
    href: Regex,
    public_base: Option<Url>,
}

impl CapabilitiesRewriter {
    /// `public_base` replaces scheme, host and port of rewritten URLs and
    /// prefixes their path; without it the renderer's authority is kept.
    pub fn new(public_base: Option<Url>) -> Result<Self, regex::Error> {
        Ok(Self {
            href: Regex::new(HREF_PATTERN)?,
            public_base,
        })
    }

    /// Rewrite every advertised URL carrying `MAP` to point at
    /// `public_path`. Returns `None` when nothing changed.
    pub fn rewrite(&self, body: &str, public_path: &str) -> Option<String> {
        let mut originals: Vec<&str> = self
            .href
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();
        if originals.is_empty() {
            return None;
        }
        // longest first, so no URL is clobbered through a shorter prefix of it
        originals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        originals.dedup();

        let mut out = body.to_string();
        let mut changed = false;
        for original in originals {
            let Some(replacement) = self.rewrite_url(original, public_path) else {
                debug!(url = original, "unparsable capabilities URL left as is");
                continue;
            };
            if replacement != original {
                out = out.replace(original, &replacement);
                changed = true;
            }
        }
        changed.then_some(out)
    }

    fn rewrite_url(&self, escaped: &str, public_path: &str) -> Option<String> {
        let mut url = Url::parse(&escaped.replace("&amp;", "&")).ok()?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("MAP"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        match &self.public_base {
            Some(base) => {
                url.set_scheme(base.scheme()).ok()?;
                url.set_host(base.host_str()).ok()?;
                url.set_port(base.port()).ok()?;
                url.set_path(&format!("{}{}", base.path().trim_end_matches('/'), public_path));
            }
            None => url.set_path(public_path),
        }
        // keeps the trailing `?` clients append their own parameters to
        url.query_pairs_mut().clear().extend_pairs(kept);

        Some(url.as_str().replace('&', "&amp;"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPS: &str = r#"<WMS_Capabilities xmlns:xlink="http://www.w3.org/1999/xlink">
<Service><OnlineResource xlink:href="http://renderer:8080/ows?MAP=/srv/projects/alice/city/city.qgs&amp;"/></Service>
<Capability><Request><GetMap><DCPType><HTTP><Get>
<OnlineResource xlink:type="simple" xlink:href="http://renderer:8080/ows?MAP=/srv/projects/alice/city/city.qgs&amp;SERVICE=WMS&amp;"/>
</Get></HTTP></DCPType></GetMap></Request>
<Layer><Style><LegendURL><OnlineResource xlink:href="http://renderer:8080/ows?map=/srv/projects/alice/city/city.qgs&amp;SERVICE=WMS&amp;REQUEST=GetLegendGraphic&amp;LAYER=roads"/></LegendURL></Style></Layer>
<Layer><MetadataURL><OnlineResource xlink:href="https://example.org/roads.html"/></MetadataURL></Layer>
</Capability></WMS_Capabilities>"#;

    #[test]
    fn points_urls_at_the_gate_and_hides_the_project_path() {
        let rewriter = CapabilitiesRewriter::new(None).unwrap();
        let out = rewriter.rewrite(CAPS, "/ows/alice/city").unwrap();

        assert!(!out.contains("/srv/projects"));
        assert!(!out.to_lowercase().contains("map="));
        assert!(out.contains(r#"xlink:href="http://renderer:8080/ows/alice/city?""#));
        assert!(out.contains(r#"xlink:href="http://renderer:8080/ows/alice/city?SERVICE=WMS""#));
        assert!(out.contains(
            "http://renderer:8080/ows/alice/city?SERVICE=WMS&amp;REQUEST=GetLegendGraphic&amp;LAYER=roads"
        ));
        assert!(out.contains(r#"xlink:href="https://example.org/roads.html""#));
    }

    #[test]
    fn rewrites_wfs_capabilities() {
        let wfs_1_1 = r#"<wfs:WFS_Capabilities xmlns:ows="http://www.opengis.net/ows" xmlns:xlink="http://www.w3.org/1999/xlink">
<ows:Operation name="GetFeature"><ows:DCP><ows:HTTP>
<ows:Get xlink:href="http://renderer:8080/ows?MAP=/srv/projects/alice/city/city.qgs&amp;"/>
<ows:Post xlink:href="http://renderer:8080/ows?MAP=/srv/projects/alice/city/city.qgs&amp;"/>
</ows:HTTP></ows:DCP></ows:Operation></wfs:WFS_Capabilities>"#;
        let wfs_1_0 = r#"<WFS_Capabilities>
<Service><OnlineResource>http://renderer:8080/ows?MAP=/srv/projects/alice/city/city.qgs&amp;SERVICE=WFS&amp;</OnlineResource></Service>
<Capability><Request><GetFeature><DCPType><HTTP>
<Get onlineResource="http://renderer:8080/ows?MAP=/srv/projects/alice/city/city.qgs&amp;"/>
</HTTP></DCPType></GetFeature></Request></Capability></WFS_Capabilities>"#;

        let rewriter = CapabilitiesRewriter::new(None).unwrap();
        let out = rewriter.rewrite(wfs_1_1, "/ows/alice/city").unwrap();
        assert!(!out.contains("/srv/projects"));
        assert!(out.contains(r#"<ows:Post xlink:href="http://renderer:8080/ows/alice/city?"/>"#));

        let out = rewriter.rewrite(wfs_1_0, "/ows/alice/city").unwrap();
        assert!(!out.contains("/srv/projects"));
        assert!(out.contains(
            "<OnlineResource>http://renderer:8080/ows/alice/city?SERVICE=WFS</OnlineResource>"
        ));
        assert!(out.contains(r#"onlineResource="http://renderer:8080/ows/alice/city?""#));
    }

    #[test]
    fn applies_public_base_url() {
        let base = Url::parse("https://maps.example.com/gis/").unwrap();
        let rewriter = CapabilitiesRewriter::new(Some(base)).unwrap();
        let out = rewriter.rewrite(CAPS, "/ows/alice/city").unwrap();
        assert!(out.contains(r#"xlink:href="https://maps.example.com/gis/ows/alice/city?SERVICE=WMS""#));
        assert!(!out.contains("renderer:8080"));
    }

    #[test]
    fn documents_without_map_urls_are_untouched() {
        let rewriter = CapabilitiesRewriter::new(None).unwrap();
        let body = r#"<a xlink:href="http://renderer/ows?SERVICE=WMS"/>"#;
        assert!(rewriter.rewrite(body, "/ows/a/b").is_none());
        assert!(rewriter.rewrite("", "/ows/a/b").is_none());
    }

    #[test]
    fn mapping_parameter_names_are_not_confused_with_map() {
        let rewriter = CapabilitiesRewriter::new(None).unwrap();
        let body = r#"<a xlink:href="http://renderer/ows?BASEMAP=x&amp;MAP=/p.qgs"/>"#;
        let out = rewriter.rewrite(body, "/ows/a/b").unwrap();
        assert!(out.contains("BASEMAP=x"));
        assert!(!out.contains("p.qgs"));
    }
}
