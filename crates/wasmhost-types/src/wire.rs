//! Protobuf messages exchanged with the VM.
//!
//! Field numbers are part of the wire contract and must not change.

use crate::action::{Action, ActionResult, ActionType};
use crate::amount::Amount;
use crate::error::TypesError;

/// Structured argument list.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoArgs {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub args: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAction {
    #[prost(uint32, tag = "1")]
    pub action_type: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub amount: Vec<u8>,
    #[prost(string, tag = "3")]
    pub method: String,
    #[prost(bytes = "vec", tag = "4")]
    pub args: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub gas_limit: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoActionResult {
    #[prost(message, optional, tag = "1")]
    pub input_action: Option<ProtoAction>,
    #[prost(bool, tag = "2")]
    pub success: bool,
    #[prost(string, tag = "3")]
    pub error: String,
    #[prost(uint64, tag = "4")]
    pub gas_used: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub output_data: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub remain_gas_cost: Vec<u8>,
    #[prost(message, repeated, tag = "7")]
    pub sub_action_results: Vec<ProtoActionResult>,
}

impl From<&Action> for ProtoAction {
    fn from(action: &Action) -> Self {
        Self {
            action_type: action.action_type.as_u32(),
            amount: action.amount.to_be_bytes(),
            method: action.method.clone(),
            args: action.args.clone(),
            gas_limit: action.gas_limit,
        }
    }
}

impl TryFrom<ProtoAction> for Action {
    type Error = TypesError;

    fn try_from(proto: ProtoAction) -> Result<Self, Self::Error> {
        Ok(Self {
            action_type: ActionType::try_from(proto.action_type)?,
            amount: Amount::from_be_slice(&proto.amount)?,
            method: proto.method,
            args: proto.args,
            gas_limit: proto.gas_limit,
        })
    }
}

impl From<&ActionResult> for ProtoActionResult {
    fn from(result: &ActionResult) -> Self {
        Self {
            input_action: Some(ProtoAction::from(&result.input_action)),
            success: result.success,
            error: result.error.clone(),
            gas_used: result.gas_used,
            output_data: result.output_data.clone(),
            remain_gas_cost: result.remaining_gas_cost.to_be_bytes(),
            sub_action_results: result
                .sub_action_results
                .iter()
                .map(ProtoActionResult::from)
                .collect(),
        }
    }
}

impl TryFrom<ProtoActionResult> for ActionResult {
    type Error = TypesError;

    fn try_from(proto: ProtoActionResult) -> Result<Self, Self::Error> {
        let input_action = proto
            .input_action
            .ok_or_else(|| TypesError::Decode("missing input action".to_string()))?;
        let sub_action_results = proto
            .sub_action_results
            .into_iter()
            .map(ActionResult::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            input_action: input_action.try_into()?,
            success: proto.success,
            error: proto.error,
            gas_used: proto.gas_used,
            output_data: proto.output_data,
            remaining_gas_cost: Amount::from_be_slice(&proto.remain_gas_cost)?,
            sub_action_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_field_tags() {
        // action_type = 1 (varint), gas_limit = 5 (varint)
        let proto = ProtoAction {
            action_type: 3,
            gas_limit: 7,
            ..Default::default()
        };
        assert_eq!(proto.encode_to_vec(), vec![0x08, 0x03, 0x28, 0x07]);

        let args = ProtoArgs { args: vec![b"a".to_vec()] };
        assert_eq!(args.encode_to_vec(), vec![0x0a, 0x01, b'a']);
    }

    #[test]
    fn test_missing_input_action_rejected() {
        let proto = ProtoActionResult {
            success: true,
            ..Default::default()
        };
        assert!(ActionResult::try_from(proto).is_err());
    }

    #[test]
    fn test_unknown_action_type_rejected() {
        let proto = ProtoAction {
            action_type: 42,
            ..Default::default()
        };
        assert_eq!(Action::try_from(proto), Err(TypesError::UnknownActionType(42)));
    }
}
