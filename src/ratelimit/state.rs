//! Persisted token bucket record.
//!
//! The record is a fixed 36-byte little-endian layout:
//!
//! | Offset | Size | Field            |
//! |--------|------|------------------|
//! | 0      | 8    | `tokens` (f64)   |
//! | 8      | 8    | `last_update_ms` (i64, unix ms) |
//! | 16     | 8    | `rate` (f64, tokens/second) |
//! | 24     | 8    | `capacity` (u64) |
//! | 32     | 4    | `version` (u32)  |

use crate::error::{CmdGptError, Result};
use std::time::Duration;

pub const STATE_VERSION: u32 = 1;
pub const STATE_LEN: usize = 36;

/// Token bucket shared by every process using one state file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketState {
    pub tokens: f64,
    pub last_update_ms: i64,
    pub rate: f64,
    pub capacity: u64,
    pub version: u32,
}

impl TokenBucketState {
    pub fn full(rate: f64, capacity: u64, now_ms: i64) -> Self {
        Self {
            tokens: capacity as f64,
            last_update_ms: now_ms,
            rate,
            capacity,
            version: STATE_VERSION,
        }
    }

    pub fn empty(rate: f64, capacity: u64, now_ms: i64) -> Self {
        Self {
            tokens: 0.0,
            ..Self::full(rate, capacity, now_ms)
        }
    }

    pub fn encode(&self) -> [u8; STATE_LEN] {
        let mut out = [0u8; STATE_LEN];
        out[0..8].copy_from_slice(&self.tokens.to_le_bytes());
        out[8..16].copy_from_slice(&self.last_update_ms.to_le_bytes());
        out[16..24].copy_from_slice(&self.rate.to_le_bytes());
        out[24..32].copy_from_slice(&self.capacity.to_le_bytes());
        out[32..36].copy_from_slice(&self.version.to_le_bytes());
        out
    }

    /// Decode a record, rejecting wrong sizes, unknown versions and
    /// values no writer could have produced.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != STATE_LEN {
            return Err(CmdGptError::RateLimiterStateError(format!(
                "expected {} bytes, found {}",
                STATE_LEN,
                bytes.len()
            )));
        }

        let version = u32::from_le_bytes(field(bytes, 32));
        if version != STATE_VERSION {
            return Err(CmdGptError::RateLimiterStateError(format!(
                "unsupported state version {} (expected {})",
                version, STATE_VERSION
            )));
        }

        let state = Self {
            tokens: f64::from_le_bytes(field(bytes, 0)),
            last_update_ms: i64::from_le_bytes(field(bytes, 8)),
            rate: f64::from_le_bytes(field(bytes, 16)),
            capacity: u64::from_le_bytes(field(bytes, 24)),
            version,
        };

        if !state.rate.is_finite() || state.rate <= 0.0 || state.capacity == 0 {
            return Err(CmdGptError::RateLimiterStateError(format!(
                "invalid bucket parameters (rate {}, capacity {})",
                state.rate, state.capacity
            )));
        }
        if !state.tokens.is_finite() || !(0.0..=state.capacity as f64).contains(&state.tokens) {
            return Err(CmdGptError::RateLimiterStateError(format!(
                "token count {} outside [0, {}]",
                state.tokens, state.capacity
            )));
        }

        Ok(state)
    }

    /// Token count at `now_ms` without modifying the state.
    pub fn projected(&self, now_ms: i64) -> f64 {
        let elapsed_ms = now_ms.saturating_sub(self.last_update_ms);
        if elapsed_ms <= 0 {
            return self.tokens;
        }
        let refilled = self.tokens + (elapsed_ms as f64 / 1000.0) * self.rate;
        refilled.min(self.capacity as f64)
    }

    /// Apply the refill for the time since the last update.
    ///
    /// A clock that moved backwards adds nothing and keeps `last_update_ms`,
    /// so the lost interval is not credited twice once it catches up.
    pub fn refill(&mut self, now_ms: i64) {
        if now_ms <= self.last_update_ms {
            return;
        }
        self.tokens = self.projected(now_ms);
        self.last_update_ms = now_ms;
    }

    /// Wait until `cost` tokens will be available at the persisted rate.
    pub fn time_until(&self, cost: f64, now_ms: i64) -> Duration {
        let available = self.projected(now_ms);
        if available >= cost {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64((cost - available) / self.rate).unwrap_or(Duration::MAX)
    }
}

fn field<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_encode_layout_is_little_endian() {
        let state = TokenBucketState {
            tokens: 2.5,
            last_update_ms: NOW,
            rate: 3.0,
            capacity: 5,
            version: STATE_VERSION,
        };
        let bytes = state.encode();

        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[0..8], &2.5f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &NOW.to_le_bytes());
        assert_eq!(&bytes[24..32], &5u64.to_le_bytes());
        assert_eq!(&bytes[32..36], &[1, 0, 0, 0]);
        assert_eq!(TokenBucketState::decode(&bytes).unwrap(), state);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = TokenBucketState::full(1.0, 5, NOW).encode();
        let err = TokenBucketState::decode(&bytes[..20]).unwrap_err();
        assert!(matches!(err, CmdGptError::RateLimiterStateError(_)));
        assert!(TokenBucketState::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let mut state = TokenBucketState::full(1.0, 5, NOW);
        state.version = 2;
        let err = TokenBucketState::decode(&state.encode()).unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_decode_rejects_impossible_values() {
        let mut state = TokenBucketState::full(1.0, 5, NOW);
        state.tokens = 6.0;
        assert!(TokenBucketState::decode(&state.encode()).is_err());

        let mut state = TokenBucketState::full(1.0, 5, NOW);
        state.rate = f64::NAN;
        assert!(TokenBucketState::decode(&state.encode()).is_err());

        let state = TokenBucketState::full(1.0, 0, NOW);
        assert!(TokenBucketState::decode(&state.encode()).is_err());
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let mut state = TokenBucketState::empty(2.0, 5, NOW);

        state.refill(NOW + 1000);
        assert_eq!(state.tokens, 2.0);
        assert_eq!(state.last_update_ms, NOW + 1000);

        state.refill(NOW + 60_000);
        assert_eq!(state.tokens, 5.0);
    }

    #[test]
    fn test_backwards_clock_adds_nothing() {
        let mut state = TokenBucketState::empty(2.0, 5, NOW);
        state.refill(NOW - 5000);

        assert_eq!(state.tokens, 0.0);
        assert_eq!(state.last_update_ms, NOW);
        assert_eq!(state.projected(NOW - 5000), 0.0);
    }

    #[test]
    fn test_time_until_uses_rate() {
        let state = TokenBucketState::empty(4.0, 5, NOW);
        assert_eq!(state.time_until(1.0, NOW), Duration::from_millis(250));
        assert_eq!(state.time_until(2.0, NOW + 250), Duration::from_millis(250));
        assert_eq!(state.time_until(1.0, NOW + 1000), Duration::ZERO);
    }
}
