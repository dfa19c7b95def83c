//! Storage reachability probe used by `/readyz` and the `/health` endpoint

use opendal::{ErrorKind, Operator};

/// List the log prefix. A prefix that does not exist yet is healthy; any
/// other error means the backend is unreachable or misconfigured.
pub async fn check_health(op: &Operator, prefix: &str) -> anyhow::Result<()> {
    let dir = match prefix.trim_matches('/') {
        "" => "/".to_string(),
        p => format!("{p}/"),
    };
    match op.list(&dir).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::anyhow!("storage health check failed on {dir}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_prefix_is_healthy() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        assert!(check_health(&op, "sealnote").await.is_ok());
        assert!(check_health(&op, "").await.is_ok());
    }
}
