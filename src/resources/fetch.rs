//! Asset fetching over HTTP or the local filesystem.
//!
//! Every asset reference in the configuration is a [`Location`]: an absolute
//! URL or a local path. Locations double as the cache and telemetry keys, so
//! two references to the same asset must render to the same absolute string.
//!
//! Fetches report a transfer size where the transport exposes one
//! (`content-length`, file metadata); [`probe_size`] recovers sizes that
//! read zero when the operator has explicitly enabled probing.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid asset location {0:?}")]
    InvalidLocation(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status} for {url}")]
    Status { status: u16, url: String },
    #[cfg(not(target_arch = "wasm32"))]
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An absolute asset location.
#[derive(Clone, Debug)]
pub enum Location {
    Url(reqwest::Url),
    #[cfg(not(target_arch = "wasm32"))]
    Path(std::path::PathBuf),
}

impl Location {
    /// Parse a config string: `http(s)://` means a URL, anything else is a
    /// local path (not available on the web target, where assets must be
    /// addressed through the page's origin).
    pub fn parse(s: &str) -> Result<Self, FetchError> {
        if s.starts_with("http://") || s.starts_with("https://") {
            return reqwest::Url::parse(s)
                .map(Location::Url)
                .map_err(|_| FetchError::InvalidLocation(s.to_string()));
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            Ok(Location::Path(std::path::PathBuf::from(s)))
        }
        #[cfg(target_arch = "wasm32")]
        {
            Err(FetchError::InvalidLocation(s.to_string()))
        }
    }

    /// Resolve a relative asset path against this location, treating `self`
    /// as a directory.
    pub fn join(&self, rel: &str) -> Result<Self, FetchError> {
        match self {
            Location::Url(url) => {
                let mut base = url.clone();
                if !base.path().ends_with('/') {
                    base.set_path(&format!("{}/", base.path()));
                }
                base.join(rel)
                    .map(Location::Url)
                    .map_err(|_| FetchError::InvalidLocation(rel.to_string()))
            }
            #[cfg(not(target_arch = "wasm32"))]
            Location::Path(path) => Ok(Location::Path(path.join(rel))),
        }
    }

    /// The directory this location lives in, for resolving sibling assets
    /// (external glTF buffers).
    pub fn parent(&self) -> Location {
        match self {
            Location::Url(url) => url
                .join(".")
                .map(Location::Url)
                .unwrap_or_else(|_| self.clone()),
            #[cfg(not(target_arch = "wasm32"))]
            Location::Path(path) => Location::Path(
                path.parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| std::path::PathBuf::from(".")),
            ),
        }
    }

    /// File extension of the referenced asset, lowercased.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            Location::Url(url) => url.path_segments()?.next_back()?.to_string(),
            #[cfg(not(target_arch = "wasm32"))]
            Location::Path(path) => path.file_name()?.to_string_lossy().into_owned(),
        };
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Url(url) => f.write_str(url.as_str()),
            #[cfg(not(target_arch = "wasm32"))]
            Location::Path(path) => f.write_str(&path.to_string_lossy()),
        }
    }
}

/// A fetched asset plus the transfer size the transport reported, if any.
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub transfer_size: Option<u64>,
}

pub async fn fetch(client: &reqwest::Client, location: &Location) -> Result<Fetched, FetchError> {
    match location {
        Location::Url(url) => {
            let response = client.get(url.clone()).send().await?;
            if !response.status().is_success() {
                return Err(FetchError::Status {
                    status: response.status().as_u16(),
                    url: url.to_string(),
                });
            }
            let transfer_size = response.content_length().filter(|n| *n > 0);
            let bytes = response.bytes().await?.to_vec();
            Ok(Fetched {
                bytes,
                transfer_size,
            })
        }
        #[cfg(not(target_arch = "wasm32"))]
        Location::Path(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                path: path.to_string_lossy().into_owned(),
                source,
            })?;
            let transfer_size = Some(bytes.len() as u64);
            Ok(Fetched {
                bytes,
                transfer_size,
            })
        }
    }
}

/// Probe an asset's size without transferring the body: a HEAD request for
/// URLs, file metadata for paths. Best effort; any failure reads as unknown.
pub async fn probe_size(client: &reqwest::Client, location: &Location) -> Option<u64> {
    match location {
        Location::Url(url) => {
            let response = client.head(url.clone()).send().await.ok()?;
            if !response.status().is_success() {
                return None;
            }
            response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)?
                .to_str()
                .ok()?
                .parse()
                .ok()
        }
        #[cfg(not(target_arch = "wasm32"))]
        Location::Path(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_url_join_treats_base_as_directory() {
        let base = Location::parse("https://cdn.example.com/assets/textures").unwrap();
        let joined = base.join("Gear_Housing/a.png").unwrap();
        assert_eq!(
            joined.to_string(),
            "https://cdn.example.com/assets/textures/Gear_Housing/a.png"
        );
        // A trailing slash on the base must resolve identically.
        let base = Location::parse("https://cdn.example.com/assets/textures/").unwrap();
        let joined = base.join("Gear_Housing/a.png").unwrap();
        assert_eq!(
            joined.to_string(),
            "https://cdn.example.com/assets/textures/Gear_Housing/a.png"
        );
    }

    #[test]
    fn test_extension_extraction() {
        let loc = Location::parse("https://cdn.example.com/a/model_Metal_ORM.ktx2").unwrap();
        assert_eq!(loc.extension().as_deref(), Some("ktx2"));
        let loc = Location::parse("studio.HDR").unwrap();
        assert_eq!(loc.extension().as_deref(), Some("hdr"));
        let loc = Location::parse("no_extension").unwrap();
        assert_eq!(loc.extension(), None);
    }

    #[tokio::test]
    async fn test_fetch_local_file_reports_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"twelve bytes").unwrap();
        let location = Location::parse(&file.path().to_string_lossy()).unwrap();

        let client = reqwest::Client::new();
        let fetched = fetch(&client, &location).await.unwrap();
        assert_eq!(fetched.bytes, b"twelve bytes");
        assert_eq!(fetched.transfer_size, Some(12));

        assert_eq!(probe_size(&client, &location).await, Some(12));
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_an_error() {
        let location = Location::parse("/definitely/not/here.glb").unwrap();
        let client = reqwest::Client::new();
        assert!(matches!(
            fetch(&client, &location).await,
            Err(FetchError::Io { .. })
        ));
    }
}
