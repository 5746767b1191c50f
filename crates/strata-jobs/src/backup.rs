//! Pre-mutation taxonomy backups.
//!
//! A backup is a pretty-printed [`TaxonomySnapshot`] written before the first
//! destructive step. Restoring one is a manual operation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use strata_core::{CategoryStore, Result, TaxonomySnapshot};

/// File name for a backup taken by run `run_id` now.
pub fn backup_file_name(run_id: Uuid) -> String {
    format!(
        "taxonomy-backup-{}-{}.json",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        run_id
    )
}

/// Snapshot the store and write it under `dir`, creating `dir` if needed.
#[instrument(skip(store), fields(subsystem = "jobs", component = "backup"))]
pub async fn write_backup(store: &dyn CategoryStore, dir: &Path, run_id: Uuid) -> Result<PathBuf> {
    let start = Instant::now();
    let snapshot = store.snapshot().await?;
    let json = serde_json::to_vec_pretty(&snapshot)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(backup_file_name(run_id));
    tokio::fs::write(&path, &json).await?;

    info!(
        path = %path.display(),
        categories = snapshot.categories.len(),
        memberships = snapshot.memberships.len(),
        bytes = json.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Taxonomy backup written"
    );
    Ok(path)
}

/// Read a backup file back into a snapshot.
pub async fn load_backup(path: &Path) -> Result<TaxonomySnapshot> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load a backup and re-apply it to the store.
#[instrument(skip(store), fields(subsystem = "jobs", component = "backup"))]
pub async fn restore_backup(store: &dyn CategoryStore, path: &Path) -> Result<TaxonomySnapshot> {
    let snapshot = load_backup(path).await?;
    store.restore_snapshot(&snapshot).await?;
    info!(
        path = %path.display(),
        categories = snapshot.categories.len(),
        "Taxonomy restored from backup"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Error;
    use strata_db::InMemoryCategoryStore;

    #[test]
    fn test_file_name_shape() {
        let run_id = Uuid::nil();
        let name = backup_file_name(run_id);
        assert!(name.starts_with("taxonomy-backup-"));
        assert!(name.ends_with(&format!("-{}.json", run_id)));
    }

    #[tokio::test]
    async fn test_write_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryCategoryStore::new();
        let travel = store.add_category("Travel").await;
        let trips = store.add_category("Trips").await;
        let post = store.add_post(None, &[trips]).await;
        store.add_hashtag(post, "RoadTrip").await.unwrap();

        let path = write_backup(&store, &dir.path().join("nested"), Uuid::now_v7())
            .await
            .unwrap();
        assert!(path.exists());

        store.reassign_posts(trips, travel).await.unwrap();
        store.soft_delete_category(trips).await.unwrap();
        store.rename_category(travel, "Journeys").await.unwrap();

        let snapshot = restore_backup(&store, &path).await.unwrap();
        assert_eq!(snapshot.categories.len(), 2);
        assert_eq!(store.categories_for_post(post).await.unwrap(), vec![trips]);
        assert_eq!(store.get_category(travel).await.unwrap().unwrap().name, "Travel");
        let restored = store.get_post(post).await.unwrap().unwrap();
        assert_eq!(restored.hashtags, vec!["RoadTrip"]);
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = load_backup(&path).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let err = load_backup(Path::new("/nonexistent/strata/backup.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
