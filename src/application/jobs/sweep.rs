//! Cron job removing pending entries whose lease has elapsed.

use std::{str::FromStr, sync::Arc, time::Duration};

use apalis::prelude::*;
use apalis_cron::Schedule;
use metrics::counter;
use time::OffsetDateTime;

use crate::{application::repos::CacheStore, domain::cache::lease_cutoff};

pub(crate) const METRIC_PENDING_PURGED: &str = "itemforge_cache_pending_purged_total";

/// Marker struct for the cron-triggered sweep.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct SweepPendingJob;

impl From<chrono::DateTime<chrono::Utc>> for SweepPendingJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct SweepPendingContext {
    pub cache: Arc<dyn CacheStore>,
    pub lease: Duration,
}

pub async fn process_sweep_pending_job(
    _job: SweepPendingJob,
    ctx: Data<SweepPendingContext>,
) -> Result<(), apalis::prelude::Error> {
    let Some(cutoff) = lease_cutoff(OffsetDateTime::now_utc(), ctx.lease) else {
        return Ok(());
    };
    match ctx.cache.purge_stale_pending(cutoff).await {
        Ok(count) if count > 0 => {
            counter!(METRIC_PENDING_PURGED).increment(count);
            tracing::info!(purged = count, "Purged pending entries past their lease");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to purge stale pending entries");
        }
        _ => {}
    }
    Ok(())
}

/// Parse the configured sweep cadence (six-field cron, seconds first).
pub fn sweep_schedule(expression: &str) -> Result<Schedule, String> {
    Schedule::from_str(expression).map_err(|err| err.to_string())
}
