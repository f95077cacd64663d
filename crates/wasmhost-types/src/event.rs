use crate::address::Address;

/// An event appended to the log by a contract.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Contract that emitted the event
    pub contract: Address,
    /// Event name
    pub name: String,
    /// Raw event arguments, in emission order
    pub args: Vec<Vec<u8>>,
}

impl Event {
    pub fn new(contract: Address, name: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self {
            contract,
            name: name.into(),
            args,
        }
    }

    /// Size used for per-byte event pricing.
    pub fn payload_len(&self) -> usize {
        self.name.len() + self.args.iter().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_len() {
        let event = Event::new(Address::ZERO, "Transfer", vec![vec![1, 2], vec![], vec![3]]);
        assert_eq!(event.payload_len(), 8 + 3);
    }
}
