//! Converts raw samples into [`NormalizedRecord`]s.

use chrono::{DateTime, Utc};
use healthsync_types::{CategoryDescriptor, CategorySample, NormalizedRecord, QuantityDescriptor};

/// Largest magnitude rendered with a forced fractional digit.
const FIXED_POINT_LIMIT: f64 = 1e15;

/// Default textual form of a quantity: integral values keep one fractional
/// digit (`72.0`), everything else uses the shortest round-trip form.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < FIXED_POINT_LIMIT {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Encodes one aggregated quantity value stamped at `time`.
#[must_use]
pub fn encode_quantity(
    descriptor: &QuantityDescriptor,
    value: f64,
    time: DateTime<Utc>,
) -> NormalizedRecord {
    let value = match descriptor.encoder() {
        Some(encode) => encode(value),
        None => format_number(value),
    };
    NormalizedRecord::new(descriptor.server_key(), time, value)
}

/// Encodes a category sample, or `None` if its value has no representation.
#[must_use]
pub fn encode_category(
    descriptor: &CategoryDescriptor,
    sample: &CategorySample,
) -> Option<NormalizedRecord> {
    descriptor
        .encode(sample.value)
        .map(|value| NormalizedRecord::new(descriptor.server_key(), sample.start, value))
}

/// Encodes a batch, dropping unrepresentable values. Returns the records and
/// the number of samples dropped.
#[must_use]
pub fn encode_categories(
    descriptor: &CategoryDescriptor,
    samples: &[CategorySample],
) -> (Vec<NormalizedRecord>, usize) {
    let records: Vec<_> = samples
        .iter()
        .filter_map(|sample| encode_category(descriptor, sample))
        .collect();
    let dropped = samples.len() - records.len();
    (records, dropped)
}
