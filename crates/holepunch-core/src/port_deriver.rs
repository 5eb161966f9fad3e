//! Deterministic mapping from a rendezvous instant to a shared ephemeral
//! TCP port, agreed by both peers purely by construction — no message
//! exchange carries the port itself.

use std::time::{SystemTime, UNIX_EPOCH};

/// Rounds `instant` to the nearest 2-second boundary (half-to-even) and
/// returns the bucket as Unix seconds. Two instants within 1s of the same
/// boundary collapse to the same bucket, which is what lets peers with
/// bounded clock skew agree on a port.
pub fn round_to_2s(instant: SystemTime) -> u64 {
    let secs = instant.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    let buckets = (secs / 2.0).round_ties_even();
    (buckets * 2.0) as u64
}

/// `P = (round_to_2s(instant) + bias) mod 65536`.
pub fn port_for(instant: SystemTime, bias: u16) -> u16 {
    let rounded = round_to_2s(instant);
    rounded.wrapping_add(bias as u64).rem_euclid(65536) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn same_2s_bucket_yields_same_port(/* P1 */) {
        let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let a = base + Duration::from_millis(100);
        let b = base + Duration::from_millis(900);
        assert_eq!(round_to_2s(a), round_to_2s(b));
        assert_eq!(port_for(a, 1000), port_for(b, 1000));
    }

    #[test]
    fn crossing_a_boundary_may_change_the_bucket() {
        let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let before = base - Duration::from_millis(1100);
        let after = base + Duration::from_millis(1100);
        assert_ne!(round_to_2s(before), round_to_2s(after));
    }

    #[test]
    fn bias_is_applied_mod_65536() {
        let instant = UNIX_EPOCH + Duration::from_secs(65536 * 3 - 1000);
        assert_eq!(port_for(instant, 1000), 0);
    }
}
