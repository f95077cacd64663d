//! Serde implementations for wasmhost-types.
//!
//! Addresses serialize as Bech32m, hashes as 0x-hex and amounts as decimal
//! strings, so snapshots and config files stay human-readable.

#[cfg(feature = "serde")]
mod serde_impls {
    use crate::{Address, Amount, Hash};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    macro_rules! impl_string_serde {
        ($ty:ty) => {
            impl Serialize for $ty {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: Serializer,
                {
                    self.to_string().serialize(serializer)
                }
            }

            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: Deserializer<'de>,
                {
                    let s = String::deserialize(deserializer)?;
                    <$ty>::from_str(&s).map_err(serde::de::Error::custom)
                }
            }
        };
    }

    impl_string_serde!(Address);
    impl_string_serde!(Hash);
    impl_string_serde!(Amount);
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use crate::{Address, Amount, Event, Hash};

    #[test]
    fn test_address_json() {
        let addr = Address::from_bytes([3u8; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.starts_with("\"wh1"));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_amount_and_hash_json() {
        let amount = Amount::from(123_456u64);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"123456\"");
        let back: Amount = serde_json::from_str("\"123456\"").unwrap();
        assert_eq!(back, amount);

        let hash = Hash::compute(b"x");
        let back: Hash = serde_json::from_str(&serde_json::to_string(&hash).unwrap()).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_event_json() {
        let event = Event::new(Address::ZERO, "Stored", vec![b"k".to_vec()]);
        let back: Event = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(back, event);
    }
}
