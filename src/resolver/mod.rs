//! Resource resolution.
//!
//! # Responsibilities
//! - Map request paths to stored content
//! - List uploaded media for the download page
//! - Persist uploads without overwriting existing files
//!
//! # Design Decisions
//! - The response generator only sees the [`Resolver`] trait
//! - Paths without an extension are templates and come back as text;
//!   everything else is returned byte-for-byte

pub mod fs;

use thiserror::Error;

pub use fs::FileResolver;

/// Errors raised while resolving or storing resources.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("There is no file '{0}'")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content of a resolved resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// A page or template (served path has no extension).
    Text(String),
    /// Any other file.
    Binary(Vec<u8>),
}

impl Content {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.into_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }
}

/// Lookup interface consumed by the response generator.
pub trait Resolver: Send + Sync {
    /// Whether `path` names a known resource.
    fn contains(&self, path: &str) -> bool;

    /// Load the resource behind `path`.
    fn content(&self, path: &str) -> Result<Content, ResolverError>;

    /// URLs of uploaded media, in a stable order.
    fn media_links(&self) -> Vec<String>;

    /// Store an upload, returning the URL it is now served under.
    ///
    /// Never overwrites an existing file: a colliding or missing name is
    /// replaced by a generated one.
    fn save_upload(&self, data: &[u8], filename: Option<&str>) -> Result<String, ResolverError>;
}
