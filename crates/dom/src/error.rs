//! Errors raised by the instance store.

use thiserror::Error;

/// Failure while reading, mutating or loading instance data.
#[derive(Debug, Error)]
pub enum DomError {
    #[error("malformed XML: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("node is no longer part of the tree")]
    StaleNode,

    #[error("the document element cannot be removed")]
    RootRemoval,

    #[error("cannot {0}")]
    InvalidTarget(&'static str),

    #[error("instance `{0}` is read-only")]
    ReadOnly(String),

    #[error("unexpected status {status} while loading `{uri}`")]
    Status { uri: String, status: u16 },

    #[error("no content received from `{0}`")]
    MissingContent(String),

    #[error("tree operation failed: {0}")]
    Tree(#[from] indextree::NodeError),
}
