//! Edge-to-cloud MQTT latency emulation
//!
//! Each message takes two hops: the on-bike edge unit to the pit gateway,
//! then the gateway to the cloud broker. The cloud hop is bimodal: most
//! messages ride the fast path, the rest hit a congested link.

use crate::stats::descriptive::{quantile_sorted, sorted};
use crate::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use serde::Serialize;

/// Share of cloud-hop messages on the fast path
pub const CLOUD_FAST_SHARE: f64 = 0.85;
/// Per-message loss probability
pub const LOSS_PROBABILITY: f64 = 0.0003;
/// Nominal per-hop loss reported in the summary (%)
pub const NOMINAL_HOP_LOSS_PCT: f64 = 0.03;
/// Base payload size (bytes)
const PAYLOAD_BASE_BYTES: i64 = 148;
/// QoS level of every publish
const QOS: u8 = 1;

/// One emulated publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyRecord {
    /// Sequence number
    pub message_id: usize,
    /// Publish time (s)
    pub timestamp_s: f64,
    /// Edge to gateway (ms)
    pub edge_to_gateway_ms: f64,
    /// Gateway to cloud (ms)
    pub gateway_to_cloud_ms: f64,
    /// Sum of both hops (ms)
    pub end_to_end_ms: f64,
    /// Payload size
    pub payload_bytes: i64,
    /// MQTT QoS level
    pub qos_level: u8,
    /// 1 when the message never arrived
    pub packet_lost: u8,
}

/// Latency percentiles of one path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Path label
    pub path: &'static str,
    /// Median (ms)
    pub p50_ms: f64,
    /// 95th percentile (ms)
    pub p95_ms: f64,
    /// 99th percentile (ms)
    pub p99_ms: f64,
    /// Worst case (ms)
    pub max_ms: f64,
    /// Lost messages (%)
    pub packet_loss_pct: f64,
}

fn gamma(shape: f64, scale: f64) -> Result<Gamma<f64>> {
    Gamma::new(shape, scale)
        .map_err(|e| Error::InvalidInput(format!("gamma({shape}, {scale}): {e}")))
}

/// Emulate `messages` publishes at a fixed interval.
///
/// # Errors
///
/// Returns `InvalidInput` if a latency distribution cannot be built.
pub fn simulate_latency<R: Rng>(
    messages: usize,
    interval_s: f64,
    rng: &mut R,
) -> Result<Vec<LatencyRecord>> {
    let edge = gamma(4.0, 2.0)?;
    let cloud_fast = gamma(10.0, 5.0)?;
    let cloud_slow = gamma(5.0, 15.0)?;

    let mut records = Vec::with_capacity(messages);
    for message_id in 0..messages {
        let edge_ms = edge.sample(rng) + 2.0;
        let cloud_ms = if rng.gen::<f64>() < CLOUD_FAST_SHARE {
            cloud_fast.sample(rng) + 20.0
        } else {
            cloud_slow.sample(rng) + 80.0
        };
        let lost = rng.gen::<f64>() < LOSS_PROBABILITY;
        let payload_bytes = PAYLOAD_BASE_BYTES + rng.gen_range(-10..30);
        #[allow(clippy::cast_precision_loss)]
        let timestamp_s = message_id as f64 * interval_s;
        records.push(LatencyRecord {
            message_id,
            timestamp_s,
            edge_to_gateway_ms: edge_ms,
            gateway_to_cloud_ms: cloud_ms,
            end_to_end_ms: edge_ms + cloud_ms,
            payload_bytes,
            qos_level: QOS,
            packet_lost: u8::from(lost),
        });
    }
    Ok(records)
}

fn path_summary(path: &'static str, values: &[f64], packet_loss_pct: f64) -> LatencySummary {
    let s = sorted(values);
    LatencySummary {
        path,
        p50_ms: quantile_sorted(&s, 0.50),
        p95_ms: quantile_sorted(&s, 0.95),
        p99_ms: quantile_sorted(&s, 0.99),
        max_ms: s.last().copied().unwrap_or(f64::NAN),
        packet_loss_pct,
    }
}

/// Per-hop and end-to-end percentiles.
///
/// The hop rows carry the nominal loss rate; only the end-to-end row
/// reports what was measured.
///
/// # Errors
///
/// Returns `InsufficientData` for an empty record set.
pub fn summarize_latency(records: &[LatencyRecord]) -> Result<Vec<LatencySummary>> {
    if records.is_empty() {
        return Err(Error::InsufficientData {
            what: "MQTT latency summary".into(),
            needed: 1,
            got: 0,
        });
    }
    let column = |f: fn(&LatencyRecord) -> f64| -> Vec<f64> { records.iter().map(f).collect() };
    let lost = records.iter().filter(|r| r.packet_lost == 1).count();
    #[allow(clippy::cast_precision_loss)]
    let measured_loss = 100.0 * lost as f64 / records.len() as f64;
    Ok(vec![
        path_summary(
            "Edge→Gateway",
            &column(|r| r.edge_to_gateway_ms),
            NOMINAL_HOP_LOSS_PCT,
        ),
        path_summary(
            "Gateway→Cloud",
            &column(|r| r.gateway_to_cloud_ms),
            NOMINAL_HOP_LOSS_PCT,
        ),
        path_summary("End-to-End", &column(|r| r.end_to_end_ms), measured_loss),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_latency_floors_and_fields() {
        let records = simulate_latency(2_000, 0.01, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(records.len(), 2_000);
        for r in &records {
            assert!(r.edge_to_gateway_ms > 2.0);
            assert!(r.gateway_to_cloud_ms > 20.0);
            assert!((r.end_to_end_ms - r.edge_to_gateway_ms - r.gateway_to_cloud_ms).abs() < 1e-9);
            assert!((138..178).contains(&r.payload_bytes));
            assert_eq!(r.qos_level, 1);
        }
        assert!((records[150].timestamp_s - 1.5).abs() < 1e-9);
        // Congested cloud path shows up in a few percent of messages
        let slow = records.iter().filter(|r| r.gateway_to_cloud_ms > 150.0).count();
        assert!(slow > 20, "{slow}");
    }

    #[test]
    fn test_summary_rows_and_loss() {
        let mut records = simulate_latency(1_000, 0.01, &mut StdRng::seed_from_u64(5)).unwrap();
        for r in &mut records {
            r.packet_lost = 0;
        }
        records[0].packet_lost = 1;
        records[1].packet_lost = 1;
        let summary = summarize_latency(&records).unwrap();
        let paths: Vec<_> = summary.iter().map(|s| s.path).collect();
        assert_eq!(paths, ["Edge→Gateway", "Gateway→Cloud", "End-to-End"]);
        for s in &summary {
            assert!(s.p50_ms <= s.p95_ms && s.p95_ms <= s.p99_ms && s.p99_ms <= s.max_ms);
        }
        assert!((summary[0].packet_loss_pct - NOMINAL_HOP_LOSS_PCT).abs() < 1e-12);
        assert!((summary[2].packet_loss_pct - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_empty_summary_rejected() {
        assert!(matches!(
            summarize_latency(&[]),
            Err(Error::InsufficientData { .. })
        ));
    }
}
