//! # access-policy
//!
//! Permission model for published GIS projects. A project carries an ordered
//! list of access roles; each role matches users by a simple predicate and
//! grants permission flags on layers and on individual attributes.
//!
//! For every request the applicable roles are resolved once and wrapped in a
//! [`PermissionContext`], which memoizes the per-layer unions for the
//! lifetime of that request only.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use access_policy::{check_project_access, loader, AccessDecision, LayerNameIndex, RequestUser};
//!
//! let settings = loader::load_settings("projects/alice/city/access.yaml").unwrap();
//! let index = LayerNameIndex::from_settings(&settings.layers);
//! let user = RequestUser::authenticated("bob");
//! if let AccessDecision::Roles(mut ctx) = check_project_access(&settings, &user) {
//!     let roads = index.resolve("ns:roads");
//!     println!("{}", ctx.layer_flags(roads));
//! }
//! ```

mod access;
mod flags;
mod layers;
pub mod loader;
mod permissions;
mod resolver;
mod schema;
pub mod store;

// Re-export primary public API at crate root.
pub use access::{check_project_access, AccessDecision};
pub use flags::Flags;
pub use layers::{local_name, LayerNameIndex, UNKNOWN_LAYER_ID};
pub use permissions::PermissionContext;
pub use resolver::{resolve_roles, RequestUser};
pub use schema::{
    AccessMode, AccessRole, AuthMode, LayerSettings, ProjectAccess, ProjectInfo, ProjectSettings,
};
pub use store::{FsProjectStore, ProjectMetadata, ProjectStore, StoreError};
