//! One-shot sample queries against the health store.
//!
//! Each query runs exactly once per fetch and yields encoded records. Store
//! errors surface as [`SyncError`] through the store error mapping.

use crate::encoder;
use crate::error::{SyncError, SyncResult};
use crate::health_store::{AnchoredQuery, HealthStore, SampleFilter, StatisticsQuery};
use crate::window::Calendar;
use chrono::{DateTime, Utc};
use healthsync_types::{AnchorToken, CategoryDescriptor, NormalizedRecord, QuantityDescriptor};
use tracing::debug;

/// Where an anchored query starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryStart {
    /// First run: samples from this instant up to now.
    Date(DateTime<Utc>),
    /// Samples added after this anchor.
    Anchor(AnchorToken),
}

/// Output of an anchored query.
#[derive(Debug, Clone, Default)]
pub struct CategoryBatch {
    pub records: Vec<NormalizedRecord>,
    /// Anchor to persist for the next run.
    pub new_anchor: Option<AnchorToken>,
    /// Samples the store returned.
    pub fetched: usize,
    /// Samples whose value had no encoding.
    pub dropped: usize,
}

/// Incremental query for a category sample type.
pub struct AnchoredSampleQuery<'a> {
    pub descriptor: &'a CategoryDescriptor,
    pub start: CategoryStart,
    pub now: DateTime<Utc>,
    pub excluded_metadata_key: &'a str,
}

impl AnchoredSampleQuery<'_> {
    pub async fn run(self, store: &dyn HealthStore) -> SyncResult<CategoryBatch> {
        let (filter, anchor) = match self.start {
            CategoryStart::Date(start) => (
                SampleFilter::between(start, self.now, self.excluded_metadata_key),
                None,
            ),
            CategoryStart::Anchor(anchor) => {
                (SampleFilter::excluding(self.excluded_metadata_key), Some(anchor))
            }
        };

        let result = store
            .anchored_query(AnchoredQuery {
                sample_type: self.descriptor.identifier().clone(),
                filter,
                anchor,
            })
            .await?;

        let fetched = result.samples.len();
        let (records, dropped) = encoder::encode_categories(self.descriptor, &result.samples);
        if dropped > 0 {
            debug!(
                "Dropped {} unencodable samples for {}",
                dropped,
                self.descriptor.identifier()
            );
        }

        Ok(CategoryBatch {
            records,
            new_anchor: result.new_anchor,
            fetched,
            dropped,
        })
    }
}

/// Interval-aggregated query for a quantity sample type.
pub struct StatisticsSampleQuery<'a> {
    pub descriptor: &'a QuantityDescriptor,
    pub start: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub excluded_metadata_key: &'a str,
    /// Calendar used for the daily anchor.
    pub calendar: Calendar,
    pub anchor_hour: u32,
}

impl StatisticsSampleQuery<'_> {
    /// Runs the query and emits one record per bucket that has a value,
    /// stamped at the bucket start.
    pub async fn run(self, store: &dyn HealthStore) -> SyncResult<Vec<NormalizedRecord>> {
        let anchor_date = self
            .calendar
            .anchor_date(self.now, self.anchor_hour)
            .ok_or(SyncError::AnchorDateComputationFailed)?;
        let aggregation = self.descriptor.aggregation();

        let collection = store
            .statistics_query(StatisticsQuery {
                sample_type: self.descriptor.identifier().clone(),
                unit: self.descriptor.unit().to_string(),
                filter: SampleFilter::between(self.start, self.now, self.excluded_metadata_key),
                aggregation,
                anchor_date,
                interval: self.descriptor.interval(),
            })
            .await?
            .ok_or(SyncError::ResultsUnavailable)?;

        Ok(collection
            .buckets
            .iter()
            .filter_map(|bucket| {
                bucket
                    .value_for(aggregation)
                    .map(|value| encoder::encode_quantity(self.descriptor, value, bucket.start))
            })
            .collect())
    }
}
