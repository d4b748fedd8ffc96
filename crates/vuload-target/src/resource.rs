//! Resources loaded from the target's resource directory.

use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File served for the root path.
pub const INDEX_FILE: &str = "index.html";

const ROOT_PATH: &str = "/";

/// The file types the demo site is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Html,
    Js,
    Css,
    Ico,
    Xml,
    Other,
}

impl ResourceKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("html") => Self::Html,
            Some("js") => Self::Js,
            Some("css") => Self::Css,
            Some("ico") => Self::Ico,
            Some("xml") => Self::Xml,
            _ => Self::Other,
        }
    }

    /// Content type for a file of this kind. Unrecognised extensions fall
    /// back to `mime_guess`, and to `text/plain` when that has no answer.
    pub fn content_type(&self, path: &Path) -> String {
        match self {
            Self::Html => "text/html".to_string(),
            Self::Js => "text/javascript".to_string(),
            Self::Css => "text/css".to_string(),
            Self::Ico => "image/x-icon".to_string(),
            Self::Xml => "application/xml".to_string(),
            Self::Other => mime_guess::from_path(path)
                .first_or_text_plain()
                .to_string(),
        }
    }
}

/// A file ready to be written into a response.
#[derive(Debug, Clone)]
pub struct Resource {
    pub data: Bytes,
    pub content_type: String,
}

impl Resource {
    /// Load the resource for `request_path` from `root`.
    ///
    /// Returns `None` when the path is rejected or the file cannot be read.
    pub async fn load(root: &Path, request_path: &str) -> Option<Self> {
        let relative = resolve_request_path(request_path)?;
        let full_path = root.join(relative);

        match tokio::fs::read(&full_path).await {
            Ok(data) => {
                let content_type = ResourceKind::from_path(&full_path).content_type(&full_path);
                Some(Self {
                    data: Bytes::from(data),
                    content_type,
                })
            },
            Err(error) => {
                debug!(path = %full_path.display(), %error, "resource not readable");
                None
            },
        }
    }
}

/// Map a request path to a path relative to the resource directory.
///
/// `/` maps to [`INDEX_FILE`]. Paths with `..`, root or prefix components
/// are rejected so a request can never leave the resource directory.
pub fn resolve_request_path(request_path: &str) -> Option<PathBuf> {
    let trimmed = if request_path == ROOT_PATH {
        INDEX_FILE
    } else {
        request_path.trim_start_matches('/')
    };
    if trimmed.is_empty() {
        return None;
    }

    let relative = Path::new(trimmed);
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| relative.to_path_buf())
}
