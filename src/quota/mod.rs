//! Daily request quota ledger
//!
//! Days are calendar days in a fixed reference timezone, independent of the
//! host's local zone. `planned` is advisory and overwritten by each
//! scheduling run; `actual` is authoritative and only ever incremented
//! atomically in the backing store.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::metrics;
use crate::models::QuotaDay;
use crate::storage::{SharedQuotaRepository, StorageResult};

/// Planned and actual request counters per quota day
#[derive(Clone)]
pub struct QuotaLedger {
    repo: SharedQuotaRepository,
    timezone: Tz,
}

impl QuotaLedger {
    /// Create a ledger over a repository
    pub fn new(repo: SharedQuotaRepository, timezone: Tz) -> Self {
        Self { repo, timezone }
    }

    /// Reference timezone
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Current quota day
    pub fn today(&self) -> NaiveDate {
        self.day_at(Utc::now())
    }

    /// Quota day containing an instant
    pub fn day_at(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Requests planned for a day
    pub async fn get_planned(&self, day: NaiveDate) -> StorageResult<u64> {
        Ok(self.repo.get(day).await?.planned_requests)
    }

    /// Overwrite the planned count for a day
    pub async fn set_planned(&self, day: NaiveDate, planned: u64) -> StorageResult<()> {
        self.repo.set_planned(day, planned).await?;
        metrics::set_quota_planned(planned);
        Ok(())
    }

    /// Requests actually issued on a day
    pub async fn get_actual(&self, day: NaiveDate) -> StorageResult<u64> {
        Ok(self.repo.get(day).await?.actual_requests)
    }

    /// Count one external call against a day, returning the new total
    pub async fn increment_actual(&self, day: NaiveDate) -> StorageResult<u64> {
        let actual = self.repo.increment_actual(day).await?;
        metrics::set_quota_actual(actual);
        Ok(actual)
    }

    /// Both counters for a day
    pub async fn snapshot(&self, day: NaiveDate) -> StorageResult<QuotaDay> {
        self.repo.get(day).await
    }
}
