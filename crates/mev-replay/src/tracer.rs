//! Call and storage tracing for replayed transactions.
//!
//! The tracer holds its own append-only vectors plus a small call stack and
//! is passed into the EVM host by reference. The closed-call list comes out
//! in post-order, mirroring when each frame returned.

use alloy::primitives::{Address, Bytes, U256};
use revm::interpreter::{
    opcode, CallInputs, CallOutcome, CallScheme, CreateInputs, CreateOutcome, Interpreter,
};
use revm::{Database, EvmContext, Inspector};
use serde::{Deserialize, Serialize};

/// Message-call flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    Call,
    DelegateCall,
    StaticCall,
    Create,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Call => "CALL",
            CallKind::DelegateCall => "DELEGATECALL",
            CallKind::StaticCall => "STATICCALL",
            CallKind::Create => "CREATE",
        }
    }
}

/// One closed frame observed during execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternalCall {
    pub kind: CallKind,
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    pub output: Bytes,
    /// Wei transferred with the call.
    pub value: U256,
    pub gas_used: u64,
    pub success: bool,
    /// Root call is depth 0.
    pub depth: u32,
}

impl InternalCall {
    /// First four bytes of the input.
    pub fn selector(&self) -> Option<[u8; 4]> {
        (self.input.len() >= 4).then(|| self.input[..4].try_into().expect("length checked"))
    }
}

/// One effective SSTORE (pre != post).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub address: Address,
    pub slot: U256,
    pub pre: U256,
    pub post: U256,
}

/// Outcome of replaying a single transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub success: bool,
    pub gas_used: u64,
    pub output: Bytes,
    /// Closed calls in post-order.
    pub internal_calls: Vec<InternalCall>,
    /// Effective storage writes in observation order.
    pub state_changes: Vec<StateChange>,
    pub error: Option<String>,
}

impl ReplayResult {
    pub fn calls_to(&self, address: Address) -> impl Iterator<Item = &InternalCall> {
        self.internal_calls
            .iter()
            .filter(move |call| call.to == address)
    }

    pub fn calls_with_selector(&self, selector: [u8; 4]) -> impl Iterator<Item = &InternalCall> + '_ {
        self.internal_calls
            .iter()
            .filter(move |call| call.selector() == Some(selector))
    }
}

struct OpenCall {
    kind: CallKind,
    from: Address,
    to: Address,
    input: Bytes,
    value: U256,
    depth: u32,
}

/// Inspector combining the call tracer (push on call, pop and close on
/// return) and the state tracer (SSTORE capture in `step`).
#[derive(Default)]
pub struct ReplayTracer {
    stack: Vec<OpenCall>,
    calls: Vec<InternalCall>,
    changes: Vec<StateChange>,
}

impl ReplayTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_call(&mut self, kind: CallKind, from: Address, to: Address, input: Bytes, value: U256) {
        let depth = self.stack.len() as u32;
        self.stack.push(OpenCall {
            kind,
            from,
            to,
            input,
            value,
            depth,
        });
    }

    fn close_call(&mut self, to_override: Option<Address>, output: Bytes, gas_used: u64, success: bool) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        self.calls.push(InternalCall {
            kind: open.kind,
            from: open.from,
            to: to_override.unwrap_or(open.to),
            input: open.input,
            output,
            value: open.value,
            gas_used,
            success,
            depth: open.depth,
        });
    }

    fn record_sstore(&mut self, address: Address, slot: U256, pre: U256, post: U256) {
        if pre == post {
            return;
        }
        self.changes.push(StateChange {
            address,
            slot,
            pre,
            post,
        });
    }

    pub fn into_parts(self) -> (Vec<InternalCall>, Vec<StateChange>) {
        (self.calls, self.changes)
    }
}

impl<DB: Database> Inspector<DB> for ReplayTracer {
    fn call(&mut self, _context: &mut EvmContext<DB>, inputs: &mut CallInputs) -> Option<CallOutcome> {
        let kind = match inputs.scheme {
            CallScheme::DelegateCall | CallScheme::CallCode => CallKind::DelegateCall,
            CallScheme::StaticCall => CallKind::StaticCall,
            _ => CallKind::Call,
        };
        self.push_call(
            kind,
            inputs.caller,
            inputs.target_address,
            inputs.input.clone(),
            inputs.value.get(),
        );
        None
    }

    fn call_end(
        &mut self,
        _context: &mut EvmContext<DB>,
        _inputs: &CallInputs,
        outcome: CallOutcome,
    ) -> CallOutcome {
        self.close_call(
            None,
            outcome.result.output.clone(),
            outcome.result.gas.spent(),
            outcome.result.result.is_ok(),
        );
        outcome
    }

    fn create(
        &mut self,
        _context: &mut EvmContext<DB>,
        inputs: &mut CreateInputs,
    ) -> Option<CreateOutcome> {
        self.push_call(
            CallKind::Create,
            inputs.caller,
            Address::ZERO,
            inputs.init_code.clone(),
            inputs.value,
        );
        None
    }

    fn create_end(
        &mut self,
        _context: &mut EvmContext<DB>,
        _inputs: &CreateInputs,
        outcome: CreateOutcome,
    ) -> CreateOutcome {
        self.close_call(
            outcome.address,
            outcome.result.output.clone(),
            outcome.result.gas.spent(),
            outcome.result.result.is_ok(),
        );
        outcome
    }

    fn step(&mut self, interp: &mut Interpreter, context: &mut EvmContext<DB>) {
        if interp.current_opcode() != opcode::SSTORE {
            return;
        }
        let (Ok(slot), Ok(post)) = (interp.stack.peek(0), interp.stack.peek(1)) else {
            return;
        };
        let address = interp.contract.target_address;
        // The write has not executed yet, so a journaled read yields the
        // pre-write word.
        let pre = context
            .sload(address, slot)
            .map(|load| load.data)
            .unwrap_or_default();
        self.record_sstore(address, slot, pre, post);
    }
}
