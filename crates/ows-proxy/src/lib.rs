//! Permission-aware WMS/WFS reverse proxy.
//!
//! Sits between map clients and an internal OGC renderer that has no notion
//! of users. Every request to `/ows/{owner}/{project}` is checked against the
//! project's access roles before the renderer sees it:
//!
//! ```text
//! Client --HTTP--> ows-proxy --HTTP--> renderer
//!                     |
//!        [access roles] [audit sink]
//! ```
//!
//! Rendering operations need `view` on every requested layer. Feature
//! queries need `query` and are narrowed to viewable attributes; feature
//! transactions need the matching edit flags on the layer and on each
//! touched attribute. Capability documents are rewritten so advertised URLs
//! point back at the proxy. Anything that fails a check is answered with a
//! bare status and never forwarded.

pub mod auth;
pub mod capabilities;
pub mod director;
pub mod error;
pub mod gate;
pub mod request;
pub mod server;
pub mod transaction;
pub mod wfs;
pub mod xml;

pub use auth::{Authenticator, TrustedHeaderAuth, DEFAULT_USER_HEADER};
pub use capabilities::CapabilitiesRewriter;
pub use director::Director;
pub use error::GateError;
pub use gate::{inspect_request, Inspection};
pub use request::{OwsOperation, OwsParams, OwsRequest};
pub use server::{Gateway, GatewayConfig};
