//! Errors raised by the execution trace and the relocator.

use thiserror::Error;

/// An error raised while recording or relocating the execution trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// The VM was asked to append a trace entry but tracing was disabled.
    #[error("tracing is not enabled for this run")]
    TraceNotEnabled,
    /// The trace was relocated more than once.
    #[error("trace was already relocated")]
    AlreadyRelocated,
    /// Relocation was attempted before a relocation table was computed.
    #[error("no relocation table was found")]
    NoRelocationFound,
    /// An operation required a relocated trace but the trace has not been relocated yet.
    #[error("trace has not been relocated yet")]
    TraceNotRelocated,
}
