//! Wall-clock mapping onto the (quarter, slot) grid (spec §6).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Quarters in a year.
pub const QUARTER_COUNT: u8 = 4;

/// Slots in a quarter.
pub const SLOTS_PER_QUARTER: u8 = 9;

/// Total slots in a year; the grid wraps `n` modulo this.
const TOTAL_SLOTS: u64 = QUARTER_COUNT as u64 * SLOTS_PER_QUARTER as u64;

/// Maps a wall-clock time onto `(quarter, slot)`, both 1-indexed.
///
/// `n = floor(now_seconds / delta) mod 36; q = floor(n/9)+1; s = (n mod 9)+1`.
pub fn current_quarter_slot(now: SystemTime, delta: Duration) -> (u8, u8) {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    let delta_secs = delta.as_secs().max(1);
    let n = (secs / delta_secs) % TOTAL_SLOTS;
    let q = (n / SLOTS_PER_QUARTER as u64) as u8 + 1;
    let s = (n % SLOTS_PER_QUARTER as u64) as u8 + 1;
    (q, s)
}

/// The wall-clock instant at which the next slot begins.
pub fn next_slot_boundary(now: SystemTime, delta: Duration) -> SystemTime {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    let delta_secs = delta.as_secs().max(1);
    let next_boundary_secs = (secs / delta_secs + 1) * delta_secs;
    UNIX_EPOCH + Duration::from_secs(next_boundary_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn maps_slot_zero_to_q1_s1() {
        assert_eq!(current_quarter_slot(at(0), Duration::from_secs(10)), (1, 1));
    }

    #[test]
    fn maps_ninth_slot_to_q1_s9() {
        assert_eq!(current_quarter_slot(at(80), Duration::from_secs(10)), (1, 9));
    }

    #[test]
    fn maps_tenth_slot_to_q2_s1() {
        assert_eq!(current_quarter_slot(at(90), Duration::from_secs(10)), (2, 1));
    }

    #[test]
    fn wraps_after_a_full_year() {
        let one_year = 36 * 10;
        assert_eq!(
            current_quarter_slot(at(one_year), Duration::from_secs(10)),
            (1, 1)
        );
    }

    #[test]
    fn next_boundary_is_strictly_after_now() {
        let delta = Duration::from_secs(10);
        let now = at(5);
        let boundary = next_slot_boundary(now, delta);
        assert_eq!(boundary, at(10));
    }

    #[test]
    fn next_boundary_from_exact_slot_start() {
        let delta = Duration::from_secs(10);
        let now = at(10);
        let boundary = next_slot_boundary(now, delta);
        assert_eq!(boundary, at(20));
    }
}
