//! Persistence for decoded readings.
//!
//! The pipeline only writes through [`TelemetryStore::insert`]; the query
//! methods serve read-side consumers. [`MemoryStore`] keeps everything in a
//! process-local buffer.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::codec::TelemetryReading;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("Invalid page request: page {page}, limit {limit} (both must be at least 1)")]
    InvalidPage { page: u32, limit: u32 },
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, StoreError> {
        if start > end {
            return Err(StoreError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Optional filters for paginated listing. Either time bound may be left open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub anomaly: Option<bool>,
}

impl ReadingFilter {
    fn matches(&self, reading: &TelemetryReading) -> bool {
        let timestamp = reading.timestamp();
        !matches!(self.start, Some(start) if timestamp < start)
            && !matches!(self.end, Some(end) if timestamp > end)
            && !matches!(self.anomaly, Some(anomaly) if reading.is_anomaly() != anomaly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32, // 1-based
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    fn validate(self) -> Result<Self, StoreError> {
        if self.page == 0 || self.limit == 0 {
            return Err(StoreError::InvalidPage {
                page: self.page,
                limit: self.limit,
            });
        }
        Ok(self)
    }

    fn offset(self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
}

/// Min/max/avg per field over a window. All zeros when the window is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTelemetry {
    pub count: u64,
    pub temperature: FieldStats,
    pub battery: FieldStats,
    pub altitude: FieldStats,
    pub signal: FieldStats,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn insert(&self, reading: &TelemetryReading) -> Result<(), StoreError>;

    /// Readings inside the range, oldest first.
    async fn query(&self, range: TimeRange) -> Result<Vec<TelemetryReading>, StoreError>;

    /// Anomalous readings inside the range, oldest first.
    async fn query_anomalies(&self, range: TimeRange) -> Result<Vec<TelemetryReading>, StoreError>;

    async fn aggregate(&self, range: TimeRange) -> Result<AggregatedTelemetry, StoreError>;

    /// The reading with the greatest timestamp.
    async fn latest(&self) -> Result<Option<TelemetryReading>, StoreError>;

    /// Up to `count` readings, newest first.
    async fn recent(&self, count: usize) -> Result<Vec<TelemetryReading>, StoreError>;

    /// One page of matching readings, newest first, plus the total match count.
    async fn paginated(
        &self,
        request: PageRequest,
        filter: ReadingFilter,
    ) -> Result<Page<TelemetryReading>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    readings: Arc<RwLock<VecDeque<TelemetryReading>>>,
    retention: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `retention` readings, evicting the oldest inserted first.
    /// `Some(0)` is treated like `None`.
    pub fn with_retention(retention: Option<usize>) -> Self {
        Self {
            readings: Arc::default(),
            retention: retention.filter(|&n| n > 0),
        }
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    async fn collect_sorted<F>(&self, keep: F, newest_first: bool) -> Vec<TelemetryReading>
    where
        F: Fn(&TelemetryReading) -> bool,
    {
        let readings = self.readings.read().await;
        let mut matched: Vec<_> = readings.iter().filter(|r| keep(r)).cloned().collect();
        drop(readings);

        if newest_first {
            matched.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        } else {
            matched.sort_by_key(TelemetryReading::timestamp);
        }
        matched
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn insert(&self, reading: &TelemetryReading) -> Result<(), StoreError> {
        let mut readings = self.readings.write().await;
        readings.push_back(reading.clone());
        if let Some(retention) = self.retention {
            while readings.len() > retention {
                readings.pop_front();
            }
        }
        Ok(())
    }

    async fn query(&self, range: TimeRange) -> Result<Vec<TelemetryReading>, StoreError> {
        Ok(self.collect_sorted(|r| range.contains(r.timestamp()), false).await)
    }

    async fn query_anomalies(&self, range: TimeRange) -> Result<Vec<TelemetryReading>, StoreError> {
        Ok(self
            .collect_sorted(|r| r.is_anomaly() && range.contains(r.timestamp()), false)
            .await)
    }

    async fn aggregate(&self, range: TimeRange) -> Result<AggregatedTelemetry, StoreError> {
        let readings = self.readings.read().await;
        let mut temperature = FieldAccumulator::default();
        let mut battery = FieldAccumulator::default();
        let mut altitude = FieldAccumulator::default();
        let mut signal = FieldAccumulator::default();
        let mut count = 0u64;

        for reading in readings.iter().filter(|r| range.contains(r.timestamp())) {
            temperature.add(reading.temperature());
            battery.add(reading.battery());
            altitude.add(reading.altitude());
            signal.add(reading.signal());
            count += 1;
        }

        Ok(AggregatedTelemetry {
            count,
            temperature: temperature.finish(),
            battery: battery.finish(),
            altitude: altitude.finish(),
            signal: signal.finish(),
        })
    }

    async fn latest(&self) -> Result<Option<TelemetryReading>, StoreError> {
        let readings = self.readings.read().await;
        Ok(readings.iter().max_by_key(|r| r.timestamp()).cloned())
    }

    async fn recent(&self, count: usize) -> Result<Vec<TelemetryReading>, StoreError> {
        let mut readings = self.collect_sorted(|_| true, true).await;
        readings.truncate(count);
        Ok(readings)
    }

    async fn paginated(
        &self,
        request: PageRequest,
        filter: ReadingFilter,
    ) -> Result<Page<TelemetryReading>, StoreError> {
        let request = request.validate()?;
        let matched = self.collect_sorted(|r| filter.matches(r), true).await;

        let total = matched.len() as u64;
        let limit = u64::from(request.limit);
        let data = matched
            .into_iter()
            .skip(request.offset())
            .take(request.limit as usize)
            .collect();

        Ok(Page {
            data,
            page: request.page,
            limit: request.limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }
}

#[derive(Default)]
struct FieldAccumulator {
    min: Option<f32>,
    max: Option<f32>,
    sum: f64,
    count: u64,
}

impl FieldAccumulator {
    fn add(&mut self, value: f32) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.sum += f64::from(value);
        self.count += 1;
    }

    fn finish(&self) -> FieldStats {
        if self.count == 0 {
            return FieldStats::default();
        }
        FieldStats {
            min: self.min.unwrap_or_default(),
            max: self.max.unwrap_or_default(),
            avg: (self.sum / self.count as f64) as f32,
        }
    }
}
