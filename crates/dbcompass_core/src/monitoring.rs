use crate::monitor::{
    CacheMetrics, ConnectionMetrics, LockMetrics, MetricKind, MonitoringSnapshot, QueryMetrics,
    TopQuery, TransactionMetrics, queries_per_sec,
};
use crate::{ConnectionRegistry, DbError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Default)]
struct CachedMetrics {
    values: HashMap<MetricKind, f64>,
    top_queries: Vec<TopQuery>,
}

/// Collects operational metrics per profile with a resilient-degrade
/// policy: every probe in the battery is guarded individually, and a
/// failing probe (commonly a privilege error on a system catalog) falls
/// back to the last value seen for this profile, or to the synthesized
/// default. The snapshot itself only fails when no connection can be
/// obtained at all — dashboards keep rendering without `SUPER`,
/// `pg_monitor`, or `VIEW SERVER STATE`-class privileges.
pub struct MonitoringCollector {
    registry: Arc<ConnectionRegistry>,
    cache: Mutex<HashMap<Uuid, CachedMetrics>>,
}

impl MonitoringCollector {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn snapshot(&self, profile_id: Uuid) -> Result<MonitoringSnapshot, DbError> {
        let profile = self
            .registry
            .get_profile(profile_id)?
            .ok_or_else(|| DbError::connection_failed("Connection not found"))?;
        let conn = self.registry.get_or_open(&profile).await?;

        let mut fresh = HashMap::new();
        for metric in MetricKind::ALL {
            match conn.probe_metric(metric).await {
                Ok(value) if value.is_finite() => {
                    fresh.insert(metric, value);
                }
                Ok(value) => {
                    log::warn!("Probe {metric} returned non-finite value {value}; discarding");
                }
                Err(e) => {
                    log::warn!("Probe {metric} failed for {}: {e}", profile.name);
                }
            }
        }

        let fresh_top = match conn.top_queries().await {
            Ok(queries) => Some(queries),
            Err(e) => {
                log::warn!("Top-queries probe failed for {}: {e}", profile.name);
                None
            }
        };

        let mut cache = self.cache.lock().await;
        let cached = cache.entry(profile_id).or_default();

        cached.values.extend(fresh);
        let top_queries = match fresh_top {
            Some(queries) => {
                cached.top_queries = queries.clone();
                queries
            }
            None => cached.top_queries.clone(),
        };

        // Fresh values were merged above, so the cache now holds the best
        // known value for every metric that has ever been probed.
        let values = cached.values.clone();
        drop(cache);

        let value = |metric: MetricKind| -> f64 {
            values
                .get(&metric)
                .copied()
                .unwrap_or_else(|| metric.fallback_value())
        };

        let snapshot = MonitoringSnapshot {
            connections: ConnectionMetrics {
                active: as_count(value(MetricKind::ActiveConnections)),
            },
            queries: QueryMetrics {
                per_sec: queries_per_sec(
                    value(MetricKind::TotalQueries),
                    value(MetricKind::UptimeSecs),
                ),
                avg_response_time_ms: value(MetricKind::AvgResponseTimeMs),
            },
            cache: CacheMetrics {
                hit_ratio: value(MetricKind::CacheHitRatio),
            },
            locks: LockMetrics {
                waiting: as_count(value(MetricKind::LockWaits)),
                deadlocks: as_count(value(MetricKind::Deadlocks)),
            },
            transactions: TransactionMetrics {
                committed: as_count(value(MetricKind::CommittedTransactions)),
                rolled_back: as_count(value(MetricKind::RolledBackTransactions)),
            },
            slow_queries: as_count(value(MetricKind::SlowQueries)),
            db_size_gb: round_gb(value(MetricKind::DatabaseSizeBytes)),
            replication_lag_secs: value(MetricKind::ReplicationLagSecs),
            table_scan_rate: value(MetricKind::TableScanRate),
            top_queries,
        };

        Ok(snapshot)
    }
}

fn as_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

fn round_gb(bytes: f64) -> f64 {
    (bytes / BYTES_PER_GB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_count_clamps_negatives_and_nan() {
        assert_eq!(as_count(-3.0), 0);
        assert_eq!(as_count(f64::NAN), 0);
        assert_eq!(as_count(4.6), 5);
    }

    #[test]
    fn round_gb_keeps_two_decimals() {
        assert_eq!(round_gb(1_610_612_736.0), 1.5);
        assert_eq!(round_gb(0.0), 0.0);
    }
}
