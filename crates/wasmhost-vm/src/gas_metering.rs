//! Per-frame gas accounting.

use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Prices of host operations. The VM prices its own instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Per byte of value returned by a storage read
    pub storage_read_per_byte: u64,
    /// Per byte of key written
    pub storage_write_per_byte: u64,
    /// Per byte of key removed
    pub storage_remove_per_byte: u64,
    /// Flat cost of a balance transfer
    pub transfer: u64,
    /// Per byte of event name and arguments
    pub event_per_byte: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            storage_read_per_byte: 1,
            storage_write_per_byte: 1,
            storage_remove_per_byte: 1,
            transfer: 0,
            event_per_byte: 0,
        }
    }
}

impl GasSchedule {
    pub fn storage_read(&self, value_len: usize) -> u64 {
        self.storage_read_per_byte.saturating_mul(value_len as u64)
    }

    pub fn storage_write(&self, key_len: usize) -> u64 {
        self.storage_write_per_byte.saturating_mul(key_len as u64)
    }

    pub fn storage_remove(&self, key_len: usize) -> u64 {
        self.storage_remove_per_byte.saturating_mul(key_len as u64)
    }

    pub fn event(&self, payload_len: usize) -> u64 {
        self.event_per_byte.saturating_mul(payload_len as u64)
    }
}

/// Gas consumed versus limit for one frame.
///
/// `consumed` never decreases and never exceeds `limit`: the charge that
/// would cross the limit pins `consumed` to `limit` and fails with
/// [`HostError::OutOfGas`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    /// Budget the frame was created with; `limit` never rises above it
    cap: u64,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            cap: limit,
            consumed: 0,
        }
    }

    pub fn consume_gas(&mut self, amount: u64) -> Result<(), HostError> {
        match self.consumed.checked_add(amount) {
            Some(total) if total <= self.limit => {
                self.consumed = total;
                Ok(())
            }
            _ => {
                let used = self.consumed.saturating_add(amount);
                self.consumed = self.limit;
                Err(HostError::OutOfGas {
                    used,
                    limit: self.limit,
                })
            }
        }
    }

    /// Install the budget the VM reports as left from here on. The VM may
    /// have spent part of the frame budget on its own before calling this.
    pub fn set_remaining_gas(&mut self, remaining: u64) {
        self.limit = self.consumed.saturating_add(remaining).min(self.cap);
    }

    pub fn gas_consumed(&self) -> u64 {
        self.consumed
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gas_meter() {
        let mut meter = GasMeter::new(100_000);
        assert_eq!(meter.limit(), 100_000);
        assert_eq!(meter.remaining(), 100_000);

        meter.consume_gas(10_000).unwrap();
        assert_eq!(meter.gas_consumed(), 10_000);
        assert_eq!(meter.remaining(), 90_000);
    }

    #[test]
    fn test_out_of_gas_pins_to_limit() {
        let mut meter = GasMeter::new(1_000);
        meter.consume_gas(600).unwrap();
        let err = meter.consume_gas(500).unwrap_err();
        assert!(matches!(err, HostError::OutOfGas { used: 1_100, limit: 1_000 }));
        assert_eq!(meter.gas_consumed(), 1_000);
        assert!(meter.is_exhausted());
    }

    #[test]
    fn test_exact_limit_is_allowed() {
        let mut meter = GasMeter::new(10);
        meter.consume_gas(10).unwrap();
        assert_eq!(meter.remaining(), 0);
        assert!(meter.consume_gas(0).is_ok());
        assert!(meter.consume_gas(1).is_err());
    }

    #[test]
    fn test_overflowing_charge() {
        let mut meter = GasMeter::new(10);
        meter.consume_gas(5).unwrap();
        let err = meter.consume_gas(u64::MAX).unwrap_err();
        assert!(matches!(err, HostError::OutOfGas { used: u64::MAX, limit: 10 }));
    }

    #[test]
    fn test_set_remaining_gas() {
        let mut meter = GasMeter::new(1_000);
        meter.consume_gas(100).unwrap();

        // VM spent 300 on its own
        meter.set_remaining_gas(600);
        assert_eq!(meter.limit(), 700);
        assert_eq!(meter.remaining(), 600);

        // never above the frame budget
        meter.set_remaining_gas(5_000);
        assert_eq!(meter.limit(), 1_000);
    }

    #[test]
    fn test_schedule_pricing() {
        let schedule = GasSchedule::default();
        assert_eq!(schedule.storage_write(32), 32);
        assert_eq!(schedule.storage_read(7), 7);
        assert_eq!(schedule.event(100), 0);
    }

    proptest! {
        #[test]
        fn prop_consumed_is_running_sum(
            limit in 0u64..10_000,
            charges in proptest::collection::vec(0u64..500, 0..40)
        ) {
            let mut meter = GasMeter::new(limit);
            let mut sum = 0u64;
            let mut failures = 0;
            for charge in charges {
                if failures > 0 {
                    break;
                }
                if sum + charge <= limit {
                    prop_assert!(meter.consume_gas(charge).is_ok());
                    sum += charge;
                    prop_assert_eq!(meter.gas_consumed(), sum);
                } else {
                    prop_assert!(meter.consume_gas(charge).is_err());
                    failures += 1;
                    prop_assert_eq!(meter.gas_consumed(), limit);
                }
            }
            prop_assert!(failures <= 1);
        }
    }
}
