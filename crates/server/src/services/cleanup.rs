//! 24-hour maintenance sweep.
//!
//! Two passes, each with the same cutoff:
//! - temp videos on drafts untouched since the cutoff are removed from
//!   storage and the draft's `tempUrl` cleared
//! - unpaid drafts created before the cutoff are deleted together with any
//!   temp video they still reference
//!
//! Storage and query failures are logged and never stop the sweep; paid
//! drafts are never deleted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};

use dash_memories_core::DraftId;

use crate::db::DraftRepository;
use crate::models::Draft;
use crate::services::storage::{ObjectStorage, extract_object_path};

/// Age after which temp videos and unpaid drafts are swept.
pub const RETENTION_HOURS: i64 = 24;

/// Counts reported by a sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub temp_videos_cleared: u64,
    pub drafts_deleted: u64,
}

/// Cutoff for a sweep starting at `now`.
#[must_use]
pub fn cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(RETENTION_HOURS)
}

/// Temp-bucket object paths referenced by these drafts.
///
/// URLs outside the temp bucket are skipped.
#[must_use]
pub fn temp_paths(drafts: &[Draft], bucket: &str) -> Vec<String> {
    drafts
        .iter()
        .filter_map(|d| d.videos.pending_temp_url())
        .filter_map(|url| extract_object_path(url, bucket))
        .collect()
}

async fn remove_objects<S: ObjectStorage>(storage: &S, bucket: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    if let Err(e) = storage.remove(bucket, paths).await {
        warn!(error = %e, count = paths.len(), "Failed to remove temp videos");
    }
}

/// Run both passes.
///
/// A failed query is logged and counts as zero, so one pass never blocks the
/// other.
#[instrument(skip(pool, storage))]
pub async fn run<S: ObjectStorage>(
    pool: &PgPool,
    storage: &S,
    temp_bucket: &str,
    now: DateTime<Utc>,
) -> CleanupReport {
    let drafts = DraftRepository::new(pool);
    let cutoff = cutoff(now);

    let report = CleanupReport {
        temp_videos_cleared: clear_stale_temp_videos(&drafts, storage, temp_bucket, cutoff).await,
        drafts_deleted: delete_expired_drafts(&drafts, storage, temp_bucket, cutoff).await,
    };
    info!(
        temp_videos_cleared = report.temp_videos_cleared,
        drafts_deleted = report.drafts_deleted,
        "Cleanup sweep finished"
    );
    report
}

async fn clear_stale_temp_videos<S: ObjectStorage>(
    drafts: &DraftRepository<'_>,
    storage: &S,
    temp_bucket: &str,
    cutoff: DateTime<Utc>,
) -> u64 {
    let stale = match drafts.stale_temp_videos(cutoff).await {
        Ok(stale) => stale,
        Err(e) => {
            error!(error = %e, "Failed to select stale temp videos");
            return 0;
        }
    };

    let mut cleared = 0;
    for draft in stale {
        let paths = temp_paths(std::slice::from_ref(&draft), temp_bucket);
        remove_objects(storage, temp_bucket, &paths).await;
        match drafts.clear_temp_url(draft.id).await {
            Ok(true) => cleared += 1,
            Ok(false) => {}
            Err(e) => warn!(slug = %draft.slug, error = %e, "Failed to clear temp video URL"),
        }
    }
    cleared
}

async fn delete_expired_drafts<S: ObjectStorage>(
    drafts: &DraftRepository<'_>,
    storage: &S,
    temp_bucket: &str,
    cutoff: DateTime<Utc>,
) -> u64 {
    let expired = match drafts.expired_drafts(cutoff).await {
        Ok(expired) => expired,
        Err(e) => {
            error!(error = %e, "Failed to select expired drafts");
            return 0;
        }
    };

    remove_objects(storage, temp_bucket, &temp_paths(&expired, temp_bucket)).await;
    let ids: Vec<DraftId> = expired.iter().map(|d| d.id).collect();
    match drafts.delete_many(&ids).await {
        Ok(deleted) => deleted,
        Err(e) => {
            error!(error = %e, count = ids.len(), "Failed to delete expired drafts");
            0
        }
    }
}
