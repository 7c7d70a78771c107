//! Gas policies and metering injection.
//!
//! A [`GasPolicy`] prices individual instructions. Before a program is
//! compiled, [`inject_metering`] rewrites it so that every metered block
//! first calls the host `gas` import with the summed cost of the block's
//! instructions. The host meter refuses the charge if the budget cannot
//! cover it, so a block that would overrun the budget never starts.
//!
//! The engine itself is unaware of the policy: swapping policies only
//! changes the costs baked into the rewritten program.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use wasm_instrument::gas_metering::{self, host_function, MemoryGrowCost, Rules};
use wasm_instrument::parity_wasm::{self, elements};

pub use wasm_instrument::parity_wasm::elements::Instruction;

use crate::error::SandboxError;

/// Module name of the injected gas import. Programs may not import from it.
pub const GAS_MODULE: &str = "meterbridge";

/// Field name of the injected gas import: `gas(cost: i64)`.
pub const GAS_FUNC: &str = "gas";

/// Prices instructions for gas metering.
pub trait GasPolicy: Send + Sync {
    /// Gas charged for executing `instruction` once.
    fn cost_of(&self, instruction: &Instruction) -> u32;

    /// Extra gas charged per page requested by `memory.grow`.
    fn memory_grow_cost(&self) -> u32 {
        0
    }
}

/// Reference policy: the same cost for every instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantGasPolicy {
    per_instruction: u32,
}

impl ConstantGasPolicy {
    pub fn new(per_instruction: u32) -> Self {
        Self { per_instruction }
    }

    pub fn per_instruction(&self) -> u32 {
        self.per_instruction
    }
}

impl Default for ConstantGasPolicy {
    fn default() -> Self {
        Self::new(meterbridge_hostapi::types::GAS_PER_INSTRUCTION)
    }
}

impl GasPolicy for ConstantGasPolicy {
    fn cost_of(&self, _instruction: &Instruction) -> u32 {
        self.per_instruction
    }
}

/// Coarse instruction kinds a [`CostTable`] is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstructionClass {
    /// Structured control flow, branches, `nop`, `unreachable`.
    Control,
    /// Direct and indirect calls.
    Call,
    /// Locals, globals, `drop`, `select`.
    Variable,
    /// Loads, stores and `memory.size`.
    Memory,
    /// `memory.grow`.
    MemoryGrow,
    /// Constants.
    Constant,
    /// Arithmetic, comparison and conversion.
    Numeric,
}

impl InstructionClass {
    pub fn of(instruction: &Instruction) -> Self {
        use Instruction::*;
        match instruction {
            Unreachable | Nop | Block(_) | Loop(_) | If(_) | Else | End | Br(_) | BrIf(_)
            | BrTable(_) | Return => Self::Control,
            Call(_) | CallIndirect(..) => Self::Call,
            GetLocal(_) | SetLocal(_) | TeeLocal(_) | GetGlobal(_) | SetGlobal(_) | Drop
            | Select => Self::Variable,
            I32Load(..) | I64Load(..) | F32Load(..) | F64Load(..) | I32Load8S(..)
            | I32Load8U(..) | I32Load16S(..) | I32Load16U(..) | I64Load8S(..) | I64Load8U(..)
            | I64Load16S(..) | I64Load16U(..) | I64Load32S(..) | I64Load32U(..)
            | I32Store(..) | I64Store(..) | F32Store(..) | F64Store(..) | I32Store8(..)
            | I32Store16(..) | I64Store8(..) | I64Store16(..) | I64Store32(..)
            | CurrentMemory(_) => Self::Memory,
            GrowMemory(_) => Self::MemoryGrow,
            I32Const(_) | I64Const(_) | F32Const(_) | F64Const(_) => Self::Constant,
            _ => Self::Numeric,
        }
    }
}

/// Policy pricing instructions by [`InstructionClass`].
///
/// Classes without an explicit entry cost `default_cost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostTable {
    default_cost: u32,
    costs: BTreeMap<InstructionClass, u32>,
    memory_grow_per_page: u32,
}

impl CostTable {
    pub fn new(default_cost: u32) -> Self {
        Self {
            default_cost,
            costs: BTreeMap::new(),
            memory_grow_per_page: 0,
        }
    }

    /// Set the cost of one instruction class.
    pub fn with_cost(mut self, class: InstructionClass, cost: u32) -> Self {
        self.costs.insert(class, cost);
        self
    }

    /// Set the per-page surcharge of `memory.grow`.
    pub fn with_memory_grow_cost(mut self, per_page: u32) -> Self {
        self.memory_grow_per_page = per_page;
        self
    }

    /// Cost of one instruction class.
    pub fn class_cost(&self, class: InstructionClass) -> u32 {
        self.costs.get(&class).copied().unwrap_or(self.default_cost)
    }
}

impl GasPolicy for CostTable {
    fn cost_of(&self, instruction: &Instruction) -> u32 {
        self.class_cost(InstructionClass::of(instruction))
    }

    fn memory_grow_cost(&self) -> u32 {
        self.memory_grow_per_page
    }
}

/// Adapts a [`GasPolicy`] to the injector's rule set.
struct PolicyRules<'a> {
    policy: &'a dyn GasPolicy,
}

impl Rules for PolicyRules<'_> {
    fn instruction_cost(&self, instruction: &Instruction) -> Option<u32> {
        Some(self.policy.cost_of(instruction))
    }

    fn memory_grow_cost(&self) -> MemoryGrowCost {
        match NonZeroU32::new(self.policy.memory_grow_cost()) {
            Some(per_page) => MemoryGrowCost::Linear(per_page),
            None => MemoryGrowCost::Free,
        }
    }

    fn call_per_local_cost(&self) -> u32 {
        0
    }
}

/// Parse a binary module.
pub(crate) fn parse_module(wasm: &[u8]) -> Result<elements::Module, SandboxError> {
    parity_wasm::deserialize_buffer::<elements::Module>(wasm)
        .map_err(|e| SandboxError::InvalidProgram(e.to_string()))
}

/// Rewrite `module` so every metered block charges its cost up front.
pub(crate) fn inject_metering(
    module: elements::Module,
    policy: &dyn GasPolicy,
) -> Result<Vec<u8>, SandboxError> {
    let rules = PolicyRules { policy };
    let backend = host_function::Injector::new(GAS_MODULE, GAS_FUNC);
    let metered = gas_metering::inject(module, backend, &rules).map_err(|_| {
        SandboxError::Instrumentation("module could not be metered".into())
    })?;
    parity_wasm::serialize(metered).map_err(|e| SandboxError::Instrumentation(e.to_string()))
}
