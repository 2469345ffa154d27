/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Where frozen documents go.

use std::path::PathBuf;

use log::debug;
use url::Url;

use crate::types::FreezeError;

const MAX_SLUG_LEN: usize = 80;

/// Receives each serialized document exactly once, after it is fully retrieved.
#[allow(async_fn_in_trait)]
pub trait Sink {
    /// Store the document for the `index`-th requested page, returning where it went.
    async fn store(&self, index: usize, url: &str, document: &str) -> Result<String, FreezeError>;
}

/// Writes documents into a directory as `<NNN>-<slug>.html`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name for the `index`-th page (0-based) at `url`.
    pub fn file_name(index: usize, url: &str) -> String {
        format!("{:03}-{}.html", index + 1, slug(url))
    }
}

impl Sink for FileSink {
    async fn store(&self, index: usize, url: &str, document: &str) -> Result<String, FreezeError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FreezeError::Persistence(format!("{}: {e}", self.dir.display())))?;
        let path = self.dir.join(Self::file_name(index, url));
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| FreezeError::Persistence(format!("{}: {e}", path.display())))?;
        debug!("Wrote {} bytes to {}", document.len(), path.display());
        Ok(path.display().to_string())
    }
}

/// Host and path of `url`, squeezed into `[a-z0-9-]`.
fn slug(url: &str) -> String {
    let raw = match Url::parse(url) {
        Ok(parsed) => format!(
            "{}{}",
            parsed.host_str().unwrap_or(parsed.scheme()),
            parsed.path()
        ),
        Err(_) => url.to_string(),
    };

    let mut slug = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}
