//! Measurement result types shared between the tester and the monitor

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One probe cycle's results, keyed by probe name
///
/// Serialized compactly and shipped to the monitor inside a
/// `STATS_UPDATE` record once per cycle.
pub type StatsSnapshot = BTreeMap<String, ProbeOutcome>;

/// Result of a single probe within one cycle
///
/// The wire form is intentionally loose JSON: a round-trip time in
/// seconds for a successful ICMP probe, the sentinel `-1` for a failed or
/// timed-out one, and a bare boolean for HTTP content checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    /// ICMP round-trip time in seconds
    Rtt(f64),
    /// ICMP probe failed, timed out, or drew the wrong reply type
    Unreachable,
    /// Whether the HTTP body matched the configured pattern
    Matched(bool),
}

impl Serialize for ProbeOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProbeOutcome::Rtt(seconds) => serializer.serialize_f64(*seconds),
            ProbeOutcome::Unreachable => serializer.serialize_i64(-1),
            ProbeOutcome::Matched(matched) => serializer.serialize_bool(*matched),
        }
    }
}

struct OutcomeVisitor;

impl Visitor<'_> for OutcomeVisitor {
    type Value = ProbeOutcome;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a round-trip time, -1, or a boolean")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(ProbeOutcome::Matched(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        if v == -1 {
            Ok(ProbeOutcome::Unreachable)
        } else {
            Ok(ProbeOutcome::Rtt(v as f64))
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(ProbeOutcome::Rtt(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(ProbeOutcome::Rtt(v))
    }
}

impl<'de> Deserialize<'de> for ProbeOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OutcomeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_forms() {
        assert_eq!(serde_json::to_string(&ProbeOutcome::Rtt(0.25)).unwrap(), "0.25");
        assert_eq!(serde_json::to_string(&ProbeOutcome::Unreachable).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&ProbeOutcome::Matched(true)).unwrap(), "true");
    }

    #[test]
    fn test_snapshot_serializes_per_target() {
        let mut snapshot = StatsSnapshot::new();
        snapshot.insert("gateway".to_string(), ProbeOutcome::Rtt(0.004));
        snapshot.insert("portal".to_string(), ProbeOutcome::Matched(false));
        snapshot.insert("remote".to_string(), ProbeOutcome::Unreachable);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"gateway":0.004,"portal":false,"remote":-1}"#);
    }

    #[test]
    fn test_outcome_round_trip() {
        for outcome in [
            ProbeOutcome::Rtt(1.5),
            ProbeOutcome::Unreachable,
            ProbeOutcome::Matched(true),
            ProbeOutcome::Matched(false),
        ] {
            let json = serde_json::to_string(&outcome).unwrap();
            let back: ProbeOutcome = serde_json::from_str(&json).unwrap();
            assert_eq!(outcome, back);
        }
    }
}
