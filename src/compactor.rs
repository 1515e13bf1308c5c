use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}

/// Compact when more than `threshold` records were appended since the last
/// compaction. Returns whether it compacted.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends <= threshold {
        return Ok(false);
    }
    info!("compacting WAL after {appends} appends");
    engine.compact_wal().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("reservo_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path.clone()).unwrap();
        let admin = Principal::new("admin-1", Role::Admin, "Admin");

        let spec = |name: &str| ResourceSpec {
            name: name.into(),
            kind: ResourceType::Lab,
            capacity: Some(20),
            location: "Building B".into(),
            features: vec![],
        };
        let lab = engine.create_resource(&admin, spec("Lab 1")).await.unwrap();
        engine
            .set_resource_status(&admin, lab.id, ResourceStatus::Maintenance)
            .await
            .unwrap();
        engine
            .set_resource_status(&admin, lab.id, ResourceStatus::Available)
            .await
            .unwrap();

        assert!(!compact_if_due(&engine, 3).await.unwrap());
        assert!(compact_if_due(&engine, 2).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert!(!compact_if_due(&engine, 0).await.unwrap());

        // Three records collapsed into one; a restart still sees the resource.
        drop(engine);
        let reopened = Engine::new(path).unwrap();
        assert_eq!(reopened.get_resource(lab.id).unwrap().status, ResourceStatus::Available);
        assert_eq!(reopened.resource_count(), 1);
    }
}
