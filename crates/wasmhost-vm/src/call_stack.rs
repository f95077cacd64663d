//! Explicit stack of active frames within one call tree.
//!
//! Bounds recursive re-entry into the VM and optionally rejects a contract
//! that is already executing further up the stack.

use std::collections::HashMap;
use wasmhost_types::{Address, Amount};

use crate::error::HostError;
use crate::MAX_CALL_DEPTH;

/// A single frame in the call stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub contract: Address,
    pub caller: Address,
    /// Amount transferred into this frame
    pub value: Amount,
    /// 0 for the root frame
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    /// Number of active frames per contract
    active: HashMap<Address, usize>,
    max_depth: usize,
    allow_reentrancy: bool,
}

impl CallStack {
    pub fn new(max_depth: usize, allow_reentrancy: bool) -> Self {
        Self {
            frames: Vec::new(),
            active: HashMap::new(),
            max_depth,
            allow_reentrancy,
        }
    }

    /// Check whether `contract` could be entered now, without entering.
    pub fn check_enter(&self, contract: &Address) -> Result<(), HostError> {
        let depth = self.frames.len();
        if depth >= self.max_depth {
            return Err(HostError::CallDepthExceeded { depth });
        }
        if !self.allow_reentrancy && self.contains(contract) {
            return Err(HostError::ReentrancyViolation(format!(
                "contract {:x} is already in call stack",
                contract
            )));
        }
        Ok(())
    }

    /// Push a frame, returning its depth.
    pub fn enter(
        &mut self,
        contract: Address,
        caller: Address,
        value: Amount,
    ) -> Result<usize, HostError> {
        self.check_enter(&contract)?;
        let depth = self.frames.len();
        *self.active.entry(contract).or_insert(0) += 1;
        self.frames.push(CallFrame {
            contract,
            caller,
            value,
            depth,
        });
        Ok(depth)
    }

    pub fn exit(&mut self) -> Result<CallFrame, HostError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| HostError::HostFault("call stack is empty".to_string()))?;
        if let Some(count) = self.active.get_mut(&frame.contract) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(&frame.contract);
            }
        }
        Ok(frame)
    }

    /// Pop frames until `depth` remain. Used after a frame that may have
    /// unwound without exiting its descendants.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            if self.exit().is_err() {
                break;
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, contract: &Address) -> bool {
        self.active.contains_key(contract)
    }

    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub fn root_frame(&self) -> Option<&CallFrame> {
        self.frames.first()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new(MAX_CALL_DEPTH, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn test_enter_exit() {
        let mut stack = CallStack::default();
        assert!(stack.is_empty());

        assert_eq!(stack.enter(addr(1), addr(0), Amount::zero()).unwrap(), 0);
        assert_eq!(stack.enter(addr(2), addr(1), Amount::from(5u64)).unwrap(), 1);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.current_frame().unwrap().contract, addr(2));
        assert_eq!(stack.root_frame().unwrap().caller, addr(0));

        let frame = stack.exit().unwrap();
        assert_eq!(frame.value, Amount::from(5u64));
        assert!(!stack.contains(&addr(2)));
        assert!(stack.contains(&addr(1)));
    }

    #[test]
    fn test_max_depth() {
        let mut stack = CallStack::new(3, true);
        for i in 0..3 {
            stack.enter(addr(i), addr(0), Amount::zero()).unwrap();
        }
        assert!(matches!(
            stack.enter(addr(9), addr(0), Amount::zero()),
            Err(HostError::CallDepthExceeded { depth: 3 })
        ));
        assert!(stack.check_enter(&addr(9)).is_err());
    }

    #[test]
    fn test_reentrancy_rejected_when_disabled() {
        let mut stack = CallStack::new(8, false);
        stack.enter(addr(1), addr(0), Amount::zero()).unwrap();
        stack.enter(addr(2), addr(1), Amount::zero()).unwrap();
        assert!(matches!(
            stack.enter(addr(1), addr(2), Amount::zero()),
            Err(HostError::ReentrancyViolation(_))
        ));
    }

    #[test]
    fn test_reentrancy_counts_nested_entries() {
        let mut stack = CallStack::default();
        stack.enter(addr(1), addr(0), Amount::zero()).unwrap();
        stack.enter(addr(1), addr(1), Amount::zero()).unwrap();
        stack.exit().unwrap();
        // still active in the outer frame
        assert!(stack.contains(&addr(1)));
        stack.exit().unwrap();
        assert!(!stack.contains(&addr(1)));
    }

    #[test]
    fn test_unwind_to() {
        let mut stack = CallStack::default();
        for i in 0..5 {
            stack.enter(addr(i), addr(0), Amount::zero()).unwrap();
        }
        stack.unwind_to(2);
        assert_eq!(stack.depth(), 2);
        assert!(!stack.contains(&addr(4)));
        assert!(stack.exit().is_ok());
        assert!(stack.exit().is_ok());
        assert!(stack.exit().is_err());
    }
}
