use crate::error::TypesError;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use std::fmt;
use std::ops::{Add, AddAssign, Mul};
use std::str::FromStr;

/// Unsigned token amount of arbitrary precision.
///
/// On the wire an amount is its minimal big-endian byte string; zero is the
/// empty string. Values wider than [`Amount::MAX_BYTES`] are rejected at the
/// boundary.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigUint);

impl Amount {
    /// Widest accepted wire encoding (256 bits).
    pub const MAX_BYTES: usize = 32;

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(val: u64) -> Self {
        Self(BigUint::from(val))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Decode a big-endian byte string, enforcing [`Amount::MAX_BYTES`]
    /// after stripping leading zeros.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let significant = bytes.iter().skip_while(|b| **b == 0).count();
        if significant > Self::MAX_BYTES {
            return Err(TypesError::AmountTooLarge {
                max: Self::MAX_BYTES,
                actual: significant,
            });
        }
        Ok(Self(BigUint::from_bytes_be(bytes)))
    }

    /// Minimal big-endian encoding; empty for zero.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        if self.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        if self.0 < rhs.0 {
            None
        } else {
            Some(Self(&self.0 - &rhs.0))
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }
}

impl From<u64> for Amount {
    fn from(val: u64) -> Self {
        Self::from_u64(val)
    }
}

impl From<u128> for Amount {
    fn from(val: u128) -> Self {
        Self(BigUint::from(val))
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Amount> for &'a Amount {
    type Output = Amount;

    fn add(self, rhs: &'a Amount) -> Self::Output {
        Amount(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += &rhs.0;
    }
}

impl Mul<u64> for &Amount {
    type Output = Amount;

    fn mul(self, rhs: u64) -> Self::Output {
        Amount(&self.0 * rhs)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl FromStr for Amount {
    type Err = TypesError;

    /// Parses a decimal string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = BigUint::from_str(s)
            .map_err(|_| TypesError::InvalidAmountString(s.to_string()))?;
        let amount = Self(value);
        if amount.to_be_bytes().len() > Self::MAX_BYTES {
            return Err(TypesError::AmountTooLarge {
                max: Self::MAX_BYTES,
                actual: amount.to_be_bytes().len(),
            });
        }
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_encodes_empty() {
        assert!(Amount::zero().to_be_bytes().is_empty());
        assert_eq!(Amount::from_be_slice(&[]).unwrap(), Amount::zero());
        assert_eq!(Amount::from_be_slice(&[0, 0, 0]).unwrap(), Amount::zero());
    }

    #[test]
    fn test_minimal_encoding() {
        assert_eq!(Amount::from(256u64).to_be_bytes(), vec![1, 0]);
        assert_eq!(Amount::from_be_slice(&[0, 1, 0]).unwrap(), Amount::from(256u64));
    }

    #[test]
    fn test_from_be_slice_too_large() {
        let wide = vec![1u8; 33];
        assert_eq!(
            Amount::from_be_slice(&wide),
            Err(TypesError::AmountTooLarge { max: 32, actual: 33 })
        );

        let mut padded = vec![0u8; 8];
        padded.extend_from_slice(&[0xff; 32]);
        assert!(Amount::from_be_slice(&padded).is_ok());
    }

    #[test]
    fn test_checked_sub() {
        let a = Amount::from(10u64);
        let b = Amount::from(3u64);
        assert_eq!(a.checked_sub(&b), Some(Amount::from(7u64)));
        assert_eq!(b.checked_sub(&a), None);
    }

    #[test]
    fn test_arithmetic_and_display() {
        let mut a = Amount::from(u64::MAX);
        a += &Amount::from(1u64);
        assert_eq!(a.to_string(), "18446744073709551616");
        assert_eq!((&Amount::from(7u64) * 3).to_u64(), Some(21));
        assert_eq!("42".parse::<Amount>().unwrap(), Amount::from(42u64));
        assert!("-1".parse::<Amount>().is_err());
    }
}
