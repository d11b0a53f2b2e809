//! Model bundle loading.
//!
//! Resolves the two bundles the expression detector needs from either a
//! remote base URL (downloaded into the local cache) or a local directory,
//! then builds the ONNX-backed detector. There is no retry: a failure leaves
//! the application without models until restart.

use crate::config::Config;
use emoscope_core::{InferenceError, OnnxExpressionDetector};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A named model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelBundle {
    pub name: &'static str,
    pub filename: &'static str,
}

pub const FACE_DETECTOR: ModelBundle = ModelBundle {
    name: "face-detector",
    filename: "det_10g.onnx",
};

pub const EXPRESSION_CLASSIFIER: ModelBundle = ModelBundle {
    name: "expression-classifier",
    filename: "emotion-ferplus-8.onnx",
};

pub const BUNDLES: [ModelBundle; 2] = [FACE_DETECTOR, EXPRESSION_CLASSIFIER];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model bundle {name} not found at {path}")]
    Missing { name: &'static str, path: String },
    #[error("failed to download {name}: {source}")]
    Download {
        name: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {name} failed with status {status}")]
    HttpStatus { name: &'static str, status: reqwest::StatusCode },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}; delete it to re-download")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("model cache I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("model initialization failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("model loading task panicked")]
    TaskFailed,
    #[error("engine: {0}")]
    Engine(#[from] crate::engine::EngineError),
}

/// Where bundles are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Remote(String),
    Local(PathBuf),
}

impl ModelSource {
    /// Interpret a configured location. `None` means "use the cache dir as-is".
    pub fn parse(location: Option<&str>, cache_dir: &Path) -> Self {
        match location {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                ModelSource::Remote(url.trim_end_matches('/').to_string())
            }
            Some(url) => {
                let path = url.strip_prefix("file://").unwrap_or(url);
                ModelSource::Local(PathBuf::from(path))
            }
            None => ModelSource::Local(cache_dir.to_path_buf()),
        }
    }
}

/// Resolved on-disk locations of both bundles.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub expression_classifier: PathBuf,
}

pub struct ModelLoader {
    source: ModelSource,
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl ModelLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            source: ModelSource::parse(config.model_url.as_deref(), &config.model_dir),
            cache_dir: config.model_dir.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Make both bundles available locally.
    pub async fn fetch(&self) -> Result<ModelPaths, LoadError> {
        Ok(ModelPaths {
            face_detector: self.fetch_bundle(&FACE_DETECTOR).await?,
            expression_classifier: self.fetch_bundle(&EXPRESSION_CLASSIFIER).await?,
        })
    }

    /// Fetch both bundles and build the detector off the async thread.
    pub async fn load(&self) -> Result<OnnxExpressionDetector, LoadError> {
        let paths = self.fetch().await?;
        let detector = tokio::task::spawn_blocking(move || {
            OnnxExpressionDetector::load(&paths.face_detector, &paths.expression_classifier)
        })
        .await
        .map_err(|_| LoadError::TaskFailed)??;
        tracing::info!("expression models ready");
        Ok(detector)
    }

    /// Whether each bundle is currently present locally.
    pub fn status(&self) -> Vec<(ModelBundle, bool)> {
        let dir = match &self.source {
            ModelSource::Local(dir) => dir,
            ModelSource::Remote(_) => &self.cache_dir,
        };
        BUNDLES.iter().map(|b| (*b, dir.join(b.filename).exists())).collect()
    }

    async fn fetch_bundle(&self, bundle: &ModelBundle) -> Result<PathBuf, LoadError> {
        match &self.source {
            ModelSource::Local(dir) => {
                let path = dir.join(bundle.filename);
                if !path.exists() {
                    return Err(LoadError::Missing {
                        name: bundle.name,
                        path: path.display().to_string(),
                    });
                }
                tracing::debug!(bundle = bundle.name, path = %path.display(), "using local bundle");
                Ok(path)
            }
            ModelSource::Remote(base) => {
                let path = self.cache_dir.join(bundle.filename);
                if path.exists() {
                    verify_cached(&path).await?;
                    tracing::debug!(bundle = bundle.name, path = %path.display(), "using cached bundle");
                    return Ok(path);
                }
                self.download(base, bundle, &path).await?;
                Ok(path)
            }
        }
    }

    async fn download(&self, base: &str, bundle: &ModelBundle, path: &Path) -> Result<(), LoadError> {
        let url = format!("{base}/{}", bundle.filename);
        tracing::info!(bundle = bundle.name, %url, "downloading model bundle");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| LoadError::Download { name: bundle.name, source })?;
        if !response.status().is_success() {
            return Err(LoadError::HttpStatus {
                name: bundle.name,
                status: response.status(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| LoadError::Download { name: bundle.name, source })?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let partial = path.with_extension("onnx.part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, path).await?;

        let digest = sha256_hex(&bytes);
        tokio::fs::write(sidecar_path(path), format!("{digest}\n")).await?;

        tracing::info!(bundle = bundle.name, bytes = bytes.len(), sha256 = %digest, "downloaded model bundle");
        Ok(())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Check a cached bundle against the digest recorded when it was downloaded.
/// Bundles placed in the cache by hand have no sidecar and are trusted.
async fn verify_cached(path: &Path) -> Result<(), LoadError> {
    let sidecar = sidecar_path(path);
    let expected = match tokio::fs::read_to_string(&sidecar).await {
        Ok(s) => s.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no checksum sidecar; skipping verification");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let actual = sha256_hex(&tokio::fs::read(path).await?);
    if actual != expected {
        return Err(LoadError::ChecksumMismatch {
            path: path.display().to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Answer every request with `status` and `body` from a local listener.
    /// Returns the base URL.
    async fn serve(status: &'static str, body: &'static [u8]) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/models")
    }

    #[tokio::test]
    async fn test_remote_download_writes_bundle_and_sidecar() {
        let base = serve("200 OK", b"weights").await;
        let dir = temp_dir("remote");
        let loader = loader_for(&dir, Some(&base));
        assert!(matches!(loader.source(), ModelSource::Remote(_)));

        let paths = loader.fetch().await.unwrap();
        for path in [&paths.face_detector, &paths.expression_classifier] {
            assert_eq!(std::fs::read(path).unwrap(), b"weights");
            assert_eq!(
                std::fs::read_to_string(sidecar_path(path)).unwrap().trim(),
                sha256_hex(b"weights")
            );
            assert!(!path.with_extension("onnx.part").exists());
            verify_cached(path).await.unwrap();
        }
        assert!(loader.status().iter().all(|(_, present)| *present));

        // A second fetch reuses the verified cache.
        let again = loader.fetch().await.unwrap();
        assert_eq!(again.face_detector, paths.face_detector);
    }

    #[tokio::test]
    async fn test_remote_error_status() {
        let base = serve("404 Not Found", b"").await;
        let dir = temp_dir("remote-404");
        let err = loader_for(&dir, Some(&base)).fetch().await.unwrap_err();
        assert!(
            matches!(err, LoadError::HttpStatus { status, .. } if status == reqwest::StatusCode::NOT_FOUND),
            "{err:?}"
        );
        assert!(!dir.join(FACE_DETECTOR.filename).exists());
        assert!(!dir.join(FACE_DETECTOR.filename).with_extension("onnx.part").exists());
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("emoscope-loader-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn loader_for(dir: &Path, url: Option<&str>) -> ModelLoader {
        let config = Config {
            model_dir: dir.to_path_buf(),
            model_url: url.map(str::to_string),
            ..Config::default()
        };
        ModelLoader::new(&config)
    }

    #[test]
    fn test_parse_sources() {
        let cache = Path::new("/cache");
        assert_eq!(
            ModelSource::parse(Some("https://example.org/models/"), cache),
            ModelSource::Remote("https://example.org/models".into())
        );
        assert_eq!(
            ModelSource::parse(Some("file:///opt/models"), cache),
            ModelSource::Local("/opt/models".into())
        );
        assert_eq!(ModelSource::parse(None, cache), ModelSource::Local("/cache".into()));
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/m/det_10g.onnx")),
            PathBuf::from("/m/det_10g.onnx.sha256")
        );
    }

    #[tokio::test]
    async fn test_local_missing_bundle_fails() {
        let dir = temp_dir("missing");
        let err = loader_for(&dir, None).fetch().await.unwrap_err();
        assert!(matches!(err, LoadError::Missing { name: "face-detector", .. }));
    }

    #[tokio::test]
    async fn test_local_bundles_resolve() {
        let dir = temp_dir("local");
        for b in BUNDLES {
            std::fs::write(dir.join(b.filename), b"onnx").unwrap();
        }
        let loader = loader_for(&dir, Some(dir.to_str().unwrap()));
        let paths = loader.fetch().await.unwrap();
        assert!(paths.face_detector.ends_with("det_10g.onnx"));
        assert!(paths.expression_classifier.ends_with("emotion-ferplus-8.onnx"));
        assert!(loader.status().iter().all(|(_, present)| *present));
    }

    #[tokio::test]
    async fn test_cached_bundle_checksum_mismatch() {
        let dir = temp_dir("checksum");
        let path = dir.join(FACE_DETECTOR.filename);
        std::fs::write(&path, b"corrupted").unwrap();
        std::fs::write(sidecar_path(&path), format!("{}\n", sha256_hex(b"original"))).unwrap();
        let err = verify_cached(&path).await.unwrap_err();
        assert!(matches!(err, LoadError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_cached_bundle_checksum_match() {
        let dir = temp_dir("checksum-ok");
        let path = dir.join(FACE_DETECTOR.filename);
        std::fs::write(&path, b"weights").unwrap();
        std::fs::write(sidecar_path(&path), sha256_hex(b"weights")).unwrap();
        assert!(verify_cached(&path).await.is_ok());
    }
}
