use access_policy::ProjectInfo;
use http::header::{HeaderName, HeaderValue, COOKIE, HOST, USER_AGENT};
use url::Url;

use crate::request::{OwsParams, OwsRequest};

/// Points requests at the renderer and the project file on its disk.
#[derive(Debug, Clone)]
pub struct Director {
    renderer: Url,
    map_root: String,
    identity_header: HeaderName,
}

impl Director {
    /// `identity_header` is the trusted header carrying the username; it is
    /// never passed on to the renderer.
    pub fn new(renderer: Url, map_root: impl Into<String>, identity_header: HeaderName) -> Self {
        Self {
            renderer,
            map_root: map_root.into(),
            identity_header,
        }
    }

    /// Project file location as the renderer sees it.
    pub fn map_path(&self, project: &ProjectInfo) -> String {
        format!(
            "{}/{}/{}/{}",
            self.map_root.trim_end_matches('/'),
            project.owner,
            project.name,
            project.project_file
        )
    }

    /// Pin `MAP` to the project and drop what the renderer must not see.
    /// Any client-supplied `MAP` is replaced.
    pub fn direct(&self, req: &mut OwsRequest, project: &ProjectInfo) {
        req.params.set("MAP", self.map_path(project));

        if !req.headers.contains_key(USER_AGENT) {
            req.headers.insert(USER_AGENT, HeaderValue::from_static(""));
        }
        req.headers.remove(COOKIE);
        req.headers.remove(HOST);
        req.headers.remove(&self.identity_header);
    }

    pub fn target_url(&self, params: &OwsParams) -> Url {
        let mut url = self.renderer.clone();
        url.set_query(Some(&params.to_query_string()));
        url
    }
}
