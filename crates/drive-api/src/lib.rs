//! Wire-format types for the Drive storage API.
//!
//! This crate holds the typed representations of the remote service's JSON
//! responses (file metadata, listing pages, OAuth token grants) and the
//! shared error taxonomy for remote failures. It contains no I/O; the HTTP
//! client lives in the `librarian` crate.

pub mod error;
pub mod nodes;
pub mod oauth;

pub use error::ApiError;
pub use nodes::{NodeKind, NodePage, RemoteNode, FOLDER_MIME};
pub use oauth::{TokenErrorBody, TokenGrant};
