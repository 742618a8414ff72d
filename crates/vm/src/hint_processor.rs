//! The hint executor interface: the VM core treats hint compilation and
//! execution as an opaque external collaborator (spec §4.7 step 1, §6).
//!
//! Hints are themselves just user-supplied Python-like code strings attached
//! to instruction offsets by the compiler; this crate never interprets that
//! code. It only defines the seam a concrete hint processor (e.g. for Cairo
//! 0's `%{ ... %}` blocks, or Cairo 1's typed hints) plugs into.

use std::any::Any;
use std::collections::HashMap;

use serde::Deserialize;

use crate::errors::hint_errors::HintError;
use crate::felt::Felt;
use crate::relocatable::Relocatable;
use crate::scopes::ExecutionScopes;
use crate::vm::VirtualMachine;

/// How a reference's `AP`-relative offset should be reinterpreted as the
/// current instruction is reached, tracking the accumulated `AP` delta
/// since the reference was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ApTracking {
    /// The nesting group this tracking belongs to.
    pub group: usize,
    /// The accumulated `AP` offset within the group.
    pub offset: usize,
}

/// A compile-time description of where a hint-visible variable lives,
/// resolved against the run context when the hint executes.
#[derive(Debug, Clone, Deserialize)]
pub struct HintReference {
    /// Offset from `AP`, if this reference is `AP`-relative.
    #[serde(default)]
    pub ap_tracking_data: Option<ApTracking>,
    /// Offset from `FP`, used when the reference is `FP`-relative instead.
    #[serde(default)]
    pub offset1: i64,
    /// A second offset, for double-dereferenced references (`[[fp + a] + b]`).
    #[serde(default)]
    pub offset2: Option<i64>,
    /// `true` if the reference denotes an address itself rather than the
    /// value stored there.
    #[serde(default)]
    pub dereference: bool,
}

/// Implemented by a concrete hint language's runtime. The VM core calls
/// [`HintProcessor::compile_hint`] once per unique hint (usually at program
/// load time) and [`HintProcessor::execute_hint`] once per step whose `PC`
/// carries compiled hints (spec §4.7 step 1).
pub trait HintProcessor {
    /// Compiles a hint's source into whatever opaque representation
    /// [`HintProcessor::execute_hint`] expects to receive back.
    fn compile_hint(
        &self,
        hint_code: &str,
        ap_tracking: &ApTracking,
        reference_ids: &HashMap<String, usize>,
        references: &[HintReference],
    ) -> Result<Box<dyn Any>, HintError>;

    /// Executes one previously compiled hint against the current VM state.
    fn execute_hint(
        &mut self,
        vm: &mut VirtualMachine,
        exec_scopes: &mut ExecutionScopes,
        hint_data: &dyn Any,
        constants: &HashMap<String, Felt>,
    ) -> Result<(), HintError>;
}

/// Where a program's hints are keyed from, chosen once when the VM is
/// constructed and fixed for the whole run (spec §4.7, "two hint-dispatch
/// modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintDispatchMode {
    /// Hints are keyed by the absolute relocatable `PC` they're attached to.
    /// Used when code may be loaded into an arbitrary segment.
    Extensive,
    /// Hints are keyed by plain offset into segment 0, the layout every
    /// Cairo 0 program uses.
    NonExtensive,
}

/// A no-op hint processor: runs with no hints compiled or executed, the
/// default a [`VirtualMachine`] is built with when no hint collaborator is
/// attached.
#[derive(Debug, Default)]
pub struct NoHints;

impl HintProcessor for NoHints {
    fn compile_hint(
        &self,
        hint_code: &str,
        _ap_tracking: &ApTracking,
        _reference_ids: &HashMap<String, usize>,
        _references: &[HintReference],
    ) -> Result<Box<dyn Any>, HintError> {
        Err(HintError::UnknownHint(hint_code.to_string()))
    }

    fn execute_hint(
        &mut self,
        _vm: &mut VirtualMachine,
        _exec_scopes: &mut ExecutionScopes,
        _hint_data: &dyn Any,
        _constants: &HashMap<String, Felt>,
    ) -> Result<(), HintError> {
        Ok(())
    }
}

/// The hints compiled for one instruction offset, in program order (spec
/// §4.7 step 1: "invoke all hints associated with the current PC").
#[derive(Default)]
pub struct CompiledHints {
    by_offset: HashMap<Relocatable, Vec<Box<dyn Any>>>,
}

impl std::fmt::Debug for CompiledHints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledHints")
            .field("len", &self.by_offset.len())
            .finish()
    }
}

impl CompiledHints {
    /// An empty hint table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a compiled hint for `pc`, appended after any already
    /// registered there.
    pub fn insert(&mut self, pc: Relocatable, hint: Box<dyn Any>) {
        self.by_offset.entry(pc).or_default().push(hint);
    }

    /// The hints registered for `pc`, in insertion order.
    pub fn get(&self, pc: Relocatable) -> &[Box<dyn Any>] {
        self.by_offset.get(&pc).map(Vec::as_slice).unwrap_or(&[])
    }
}
