//! Action descriptors and the recursive ActionResult record.
//!
//! One [`ActionResult`] describes one frame: what was asked of it, how it
//! ended and the ordered results of the sub-calls it made.

use crate::amount::Amount;
use crate::error::TypesError;
use crate::wire::ProtoActionResult;
use prost::Message;

/// Kind of action a frame performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ActionType {
    FunctionCall = 1,
    Transfer = 2,
    DeployContract = 3,
}

impl ActionType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ActionType {
    type Error = TypesError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::FunctionCall),
            2 => Ok(Self::Transfer),
            3 => Ok(Self::DeployContract),
            other => Err(TypesError::UnknownActionType(other)),
        }
    }
}

/// What a frame was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub action_type: ActionType,
    pub amount: Amount,
    /// Called method; empty for deploys and transfers
    pub method: String,
    /// Packed arguments as supplied by the caller
    pub args: Vec<u8>,
    pub gas_limit: u64,
}

impl Action {
    pub fn call(method: impl Into<String>, args: Vec<u8>, amount: Amount, gas_limit: u64) -> Self {
        Self {
            action_type: ActionType::FunctionCall,
            amount,
            method: method.into(),
            args,
            gas_limit,
        }
    }

    pub fn deploy(args: Vec<u8>, amount: Amount, gas_limit: u64) -> Self {
        Self {
            action_type: ActionType::DeployContract,
            amount,
            method: String::new(),
            args,
            gas_limit,
        }
    }
}

/// Outcome of one frame plus the outcomes of its sub-calls, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionResult {
    pub input_action: Action,
    pub success: bool,
    pub error: String,
    pub gas_used: u64,
    pub output_data: Vec<u8>,
    /// Value of the gas left unused, priced at the minimum fee per gas
    pub remaining_gas_cost: Amount,
    pub sub_action_results: Vec<ActionResult>,
}

impl ActionResult {
    /// A finished frame that made no sub-calls.
    pub fn leaf(input_action: Action, success: bool, error: impl Into<String>, gas_used: u64) -> Self {
        Self {
            input_action,
            success,
            error: error.into(),
            gas_used,
            output_data: Vec::new(),
            remaining_gas_cost: Amount::zero(),
            sub_action_results: Vec::new(),
        }
    }

    /// A frame that was rejected before running.
    pub fn failed(input_action: Action, error: impl Into<String>, gas_used: u64) -> Self {
        Self::leaf(input_action, false, error, gas_used)
    }

    /// Cap every node's retained argument bytes at `max_len`, depth first.
    /// Nothing but `input_action.args` is touched.
    pub fn truncate_args(&mut self, max_len: usize) {
        self.input_action.args.truncate(max_len);
        for child in &mut self.sub_action_results {
            child.truncate_args(max_len);
        }
    }

    /// Number of nodes in the tree rooted here.
    pub fn node_count(&self) -> usize {
        1 + self
            .sub_action_results
            .iter()
            .map(ActionResult::node_count)
            .sum::<usize>()
    }

    /// Encode as the protobuf ActionResult message.
    pub fn to_bytes(&self) -> Vec<u8> {
        ProtoActionResult::from(self).encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        ProtoActionResult::decode(bytes)?.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(args_len: usize, children: Vec<ActionResult>) -> ActionResult {
        let mut result = ActionResult::leaf(
            Action::call("run", vec![7u8; args_len], Amount::from(5u64), 1_000),
            true,
            "",
            40,
        );
        result.sub_action_results = children;
        result
    }

    #[test]
    fn test_action_type_conversion() {
        assert_eq!(ActionType::try_from(1).unwrap(), ActionType::FunctionCall);
        assert_eq!(ActionType::try_from(2).unwrap(), ActionType::Transfer);
        assert_eq!(ActionType::try_from(3).unwrap(), ActionType::DeployContract);
        assert_eq!(ActionType::try_from(0), Err(TypesError::UnknownActionType(0)));
        assert_eq!(ActionType::DeployContract.as_u32(), 3);
    }

    #[test]
    fn test_truncate_args_recursive() {
        let mut tree = node(300, vec![node(150, vec![node(101, vec![])]), node(20, vec![])]);
        tree.truncate_args(100);

        assert_eq!(tree.input_action.args.len(), 100);
        assert_eq!(tree.sub_action_results[0].input_action.args.len(), 100);
        assert_eq!(
            tree.sub_action_results[0].sub_action_results[0].input_action.args.len(),
            100
        );
        assert_eq!(tree.sub_action_results[1].input_action.args.len(), 20);
        assert_eq!(tree.gas_used, 40);
        assert!(tree.success);
    }

    #[test]
    fn test_node_count() {
        let tree = node(0, vec![node(0, vec![node(0, vec![])]), node(0, vec![])]);
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut tree = node(3, vec![ActionResult::failed(
            Action::deploy(vec![1], Amount::zero(), 50),
            "no code at address",
            50,
        )]);
        tree.output_data = b"ok".to_vec();
        tree.remaining_gas_cost = Amount::from(960u64);

        let decoded = ActionResult::from_bytes(&tree.to_bytes()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_from_bytes_garbage() {
        assert!(ActionResult::from_bytes(&[0xff, 0xff, 0xff]).is_err());
    }
}
