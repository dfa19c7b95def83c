//! OpenDAL operator factory for the log backends

use anyhow::{Context, Result};
use opendal::Operator;
use sealnote_core::config::{expand_tilde, StoreConfig};

/// Credentials for S3-compatible endpoints, resolved by the caller.
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an operator for the configured backend.
///
/// `memory` and `fs` need no credentials. `s3` uses path-style addressing
/// (the opendal default), which SeaweedFS and MinIO require. If
/// `enforce_tls` is set, plaintext HTTP endpoints are refused; otherwise they
/// only produce a warning.
pub fn build_operator(cfg: &StoreConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    let op = match cfg.backend.as_str() {
        "memory" => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
        "fs" => {
            let root = expand_tilde(&cfg.root);
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            Operator::new(builder)
                .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish()
        }
        "s3" => {
            check_endpoint_tls(cfg)?;
            let creds = creds.context("s3 backend requires access key credentials")?;
            let builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            Operator::new(builder)
                .context("creating OpenDAL S3 operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .layer(
                    opendal::layers::RetryLayer::new()
                        .with_max_times(5)
                        .with_jitter(),
                )
                .finish()
        }
        other => anyhow::bail!("unknown store backend {other:?} (expected memory, fs or s3)"),
    };

    tracing::info!(backend = %cfg.backend, "store operator ready");
    Ok(op)
}

fn check_endpoint_tls(cfg: &StoreConfig) -> Result<()> {
    if !cfg.endpoint.starts_with("http://") {
        return Ok(());
    }
    if cfg.enforce_tls {
        anyhow::bail!(
            "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
             Use an HTTPS endpoint or set store.enforce_tls = false for local development.",
            cfg.endpoint
        );
    }
    tracing::warn!(
        endpoint = %cfg.endpoint,
        "S3 endpoint uses plaintext HTTP; set store.enforce_tls = true and use HTTPS in production"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> S3Credentials {
        S3Credentials {
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
        }
    }

    #[test]
    fn test_memory_backend() {
        let cfg = StoreConfig::default();
        assert!(build_operator(&cfg, None).is_ok());
    }

    #[test]
    fn test_fs_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig {
            backend: "fs".into(),
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(build_operator(&cfg, None).is_ok());
    }

    #[test]
    fn test_s3_http_allowed_without_enforce_tls() {
        let cfg = StoreConfig {
            backend: "s3".into(),
            endpoint: "http://localhost:8333".into(),
            enforce_tls: false,
            ..Default::default()
        };
        assert!(build_operator(&cfg, Some(&creds())).is_ok());
    }

    #[test]
    fn test_s3_http_refused_with_enforce_tls() {
        let cfg = StoreConfig {
            backend: "s3".into(),
            endpoint: "http://insecure:8333".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let err = build_operator(&cfg, Some(&creds())).unwrap_err();
        assert!(err.to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_s3_requires_credentials() {
        let cfg = StoreConfig {
            backend: "s3".into(),
            endpoint: "https://s3.example.com".into(),
            ..Default::default()
        };
        assert!(build_operator(&cfg, None).is_err());
    }

    #[test]
    fn test_unknown_backend() {
        let cfg = StoreConfig {
            backend: "floppy".into(),
            ..Default::default()
        };
        assert!(build_operator(&cfg, None).is_err());
    }
}
