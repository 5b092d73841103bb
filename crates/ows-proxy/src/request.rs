use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, Method, Uri};
use url::form_urlencoded;

/// Query parameters of an OWS request, in their original order.
///
/// OWS parameter names are case-insensitive (`SERVICE`, `service` and
/// `Service` are the same parameter); values are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwsParams {
    pairs: Vec<(String, String)>,
}

impl OwsParams {
    pub fn parse(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self::parse(uri.query().unwrap_or_default())
    }

    /// First value of `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// How often `name` occurs, in any letter case.
    pub fn count(&self, name: &str) -> usize {
        self.pairs
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .count()
    }

    /// Replace every occurrence of `name` (in any case) with a single pair.
    ///
    /// The new pair takes the position of the first removed occurrence, or
    /// is appended when there was none.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let position = self
            .pairs
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name));
        self.remove(name);
        let pair = (name.to_string(), value.into());
        match position {
            Some(pos) => self.pairs.insert(pos, pair),
            None => self.pairs.push(pair),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parameters whose name satisfies `pred`, case preserved.
    pub fn matching<'a>(
        &'a self,
        pred: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.iter().filter(move |(k, _)| pred(k))
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

/// Upper-cased `SERVICE` value, if any.
fn service(params: &OwsParams) -> Option<String> {
    params.get("SERVICE").map(|s| s.trim().to_ascii_uppercase())
}

/// Lower-cased `REQUEST` value, if any.
fn operation(params: &OwsParams) -> Option<String> {
    params.get("REQUEST").map(|s| s.trim().to_ascii_lowercase())
}

/// The operations the gate treats differently. Everything else is
/// [`OwsOperation::PassThrough`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwsOperation {
    /// WMS or WFS capability listing; the response is rewritten.
    GetCapabilities,
    /// WMS map rendering.
    GetMap,
    /// WMS print composition, which renders layers like `GetMap`.
    GetPrint,
    /// WMS feature identification on rendered layers.
    GetFeatureInfo,
    /// WFS feature query in key-value form (GET).
    GetFeatureKvp,
    /// WFS transaction requested in key-value form; never supported.
    TransactionKvp,
    /// WFS POST whose operation is only known from the body's root element.
    WfsDocument,
    /// WFS feature query document.
    GetFeature,
    /// WFS transaction document.
    Transaction,
    PassThrough,
}

impl OwsOperation {
    pub fn classify(method: &Method, params: &OwsParams) -> Self {
        let service = service(params);
        let operation = operation(params);

        match (service.as_deref(), operation.as_deref()) {
            (Some("WMS" | "WFS"), Some("getcapabilities")) => OwsOperation::GetCapabilities,
            (Some("WMS"), Some("getmap")) => OwsOperation::GetMap,
            (Some("WMS"), Some("getprint")) => OwsOperation::GetPrint,
            (Some("WMS"), Some("getfeatureinfo")) => OwsOperation::GetFeatureInfo,
            (Some("WFS"), _) if method == Method::POST => OwsOperation::WfsDocument,
            (Some("WFS"), Some("getfeature")) => OwsOperation::GetFeatureKvp,
            (Some("WFS"), Some("transaction")) => OwsOperation::TransactionKvp,
            _ => OwsOperation::PassThrough,
        }
    }

    /// Whether the operation is decided by the request body.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            OwsOperation::WfsDocument | OwsOperation::GetFeature | OwsOperation::Transaction
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OwsOperation::GetCapabilities => "GetCapabilities",
            OwsOperation::GetMap => "GetMap",
            OwsOperation::GetPrint => "GetPrint",
            OwsOperation::GetFeatureInfo => "GetFeatureInfo",
            OwsOperation::GetFeatureKvp | OwsOperation::GetFeature => "GetFeature",
            OwsOperation::TransactionKvp | OwsOperation::Transaction => "Transaction",
            OwsOperation::WfsDocument => "WfsDocument",
            OwsOperation::PassThrough => "PassThrough",
        }
    }
}

/// A fully buffered inbound request on its way to the renderer.
#[derive(Debug, Clone)]
pub struct OwsRequest {
    pub method: Method,
    pub params: OwsParams,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Path the client used to reach the gate; capability documents are
    /// rewritten to point back to it.
    pub public_path: String,
}

impl OwsRequest {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            params: OwsParams::from_uri(uri),
            headers,
            body,
            public_path: uri.path().to_string(),
        }
    }

    /// Swap in a new body and keep `Content-Length` consistent with it.
    pub fn replace_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        set_content_length(&mut self.headers, self.body.len());
    }
}

pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
}
