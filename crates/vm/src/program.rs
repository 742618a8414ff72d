//! Program loading: the compiled-Cairo JSON artifact the runner consumes
//! (spec §6, "Program input").
//!
//! The VM core never compiles Cairo source; it only deserializes the
//! compiler's output into the handful of fields [`crate::runner::CairoRunner`]
//! needs to set up a run.

use std::collections::HashMap;

use serde::Deserialize;

use crate::builtins::BuiltinName;
use crate::errors::runner_errors::RunnerError;
use crate::felt::Felt;
use crate::hint_processor::{ApTracking, HintReference};
use crate::relocatable::MaybeRelocatable;

/// One compiled hint attached to a program offset: its source code plus
/// enough compile-time context for a [`crate::hint_processor::HintProcessor`]
/// to resolve the references it closes over (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct HintParams {
    /// The hint's source code, opaque to the VM core.
    pub code: String,
    /// `AP`-tracking state at the point the hint is attached.
    pub flow_tracking_data: FlowTrackingData,
    /// Scope names visible to the hint, in compiler-assigned order.
    #[serde(default)]
    pub accessible_scopes: Vec<String>,
}

/// The `AP`-tracking half of a [`HintParams`] (named to match the compiler's
/// own JSON field layout).
#[derive(Debug, Clone, Deserialize)]
pub struct FlowTrackingData {
    /// The `AP`-tracking record active at this hint's offset.
    pub ap_tracking: ApTracking,
    /// Maps a reference's name to its index into [`Program::reference_manager`].
    #[serde(default)]
    pub reference_ids: HashMap<String, usize>,
}

/// A compiled program: bytecode plus the metadata needed to run it and to
/// attribute errors back to source (spec §6, "Program input").
#[derive(Debug, Clone, Deserialize)]
pub struct Program {
    /// The builtins this program declares, in the order they appear in the
    /// program JSON (canonical order is checked at runner setup, not here).
    #[serde(default, deserialize_with = "deserialize_builtins")]
    pub builtins: Vec<BuiltinName>,
    /// The program's bytecode: instruction words and immediates, in order.
    #[serde(deserialize_with = "deserialize_data")]
    pub data: Vec<MaybeRelocatable>,
    /// The `main` entrypoint offset, if the program declares one.
    #[serde(default)]
    pub main: Option<usize>,
    /// The program's `start` label offset, for proof-mode runs.
    #[serde(default)]
    pub start: Option<usize>,
    /// The program's `end` label offset, for proof-mode runs.
    #[serde(default)]
    pub end: Option<usize>,
    /// Named constants the program's hints and identifiers may reference.
    #[serde(default, deserialize_with = "deserialize_constants")]
    pub constants: HashMap<String, Felt>,
    /// Compiled hints, keyed by the program offset they are attached to.
    #[serde(default, deserialize_with = "deserialize_hints")]
    pub hints: HashMap<usize, Vec<HintParams>>,
    /// Every reference a compiled hint may point into, in declaration order.
    #[serde(default, deserialize_with = "deserialize_reference_manager")]
    pub reference_manager: Vec<HintReference>,
    /// Identifier metadata, surfaced verbatim in error attribution (spec §7).
    #[serde(default)]
    pub identifiers: serde_json::Map<String, serde_json::Value>,
    /// `with_attr error_message(...)` metadata, surfaced verbatim in errors.
    #[serde(default)]
    pub error_message_attributes: Vec<serde_json::Value>,
    /// Maps a program offset to the source location it was compiled from.
    #[serde(default)]
    pub instruction_locations: serde_json::Map<String, serde_json::Value>,
}

impl Program {
    /// Parses a program from the compiler's JSON output.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RunnerError> {
        serde_json::from_slice(bytes)
            .map_err(|e| RunnerError::MemoryInitializationError(e.to_string()))
    }

    /// The entrypoint offset a non-proof-mode run starts from.
    pub fn main_offset(&self) -> Result<usize, RunnerError> {
        self.main.ok_or(RunnerError::MissingMain)
    }

    /// The `start` offset a proof-mode run's public memory begins at.
    pub fn start_offset(&self) -> Result<usize, RunnerError> {
        self.start.ok_or(RunnerError::NoProgramStart)
    }

    /// The `end` offset a proof-mode run's public memory ends at.
    pub fn end_offset(&self) -> Result<usize, RunnerError> {
        self.end.ok_or(RunnerError::NoProgramEnd)
    }
}

fn deserialize_data<'de, D>(deserializer: D) -> Result<Vec<MaybeRelocatable>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<HexFelt> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|f| f.0.into()).collect())
}

fn deserialize_constants<'de, D>(deserializer: D) -> Result<HashMap<String, Felt>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, HexFelt> = HashMap::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.0)).collect())
}

fn deserialize_builtins<'de, D>(deserializer: D) -> Result<Vec<BuiltinName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|name| {
            BuiltinName::CANONICAL_ORDER
                .iter()
                .find(|b| b.as_str() == name)
                .copied()
                .ok_or_else(|| serde::de::Error::custom(format!("unknown builtin: {name}")))
        })
        .collect()
}

/// The compiler wraps `reference_manager` in a `{"references": [...]}`
/// envelope rather than emitting a bare array.
#[derive(Deserialize)]
struct ReferenceManagerJson {
    #[serde(default)]
    references: Vec<HintReference>,
}

fn deserialize_reference_manager<'de, D>(deserializer: D) -> Result<Vec<HintReference>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(ReferenceManagerJson::deserialize(deserializer)?.references)
}

fn deserialize_hints<'de, D>(
    deserializer: D,
) -> Result<HashMap<usize, Vec<HintParams>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, Vec<HintParams>> = HashMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(offset, hints)| {
            offset
                .parse::<usize>()
                .map(|offset| (offset, hints))
                .map_err(|e| serde::de::Error::custom(e.to_string()))
        })
        .collect()
}

/// A [`Felt`] parsed from the compiler's `"0x..."` hex-string encoding,
/// used only at the JSON boundary.
struct HexFelt(Felt);

impl<'de> Deserialize<'de> for HexFelt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let hex = s.strip_prefix("0x").unwrap_or(&s);
        Felt::from_hex(&format!("0x{hex}"))
            .map(HexFelt)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_program() {
        let json = r#"{
            "builtins": ["output", "range_check"],
            "data": ["0x1", "0xa"],
            "main": 0,
            "constants": {"a.b.SOME_CONST": "0x2"},
            "hints": {"0": []},
            "reference_manager": { "references": [] }
        }"#;
        let program = Program::from_json(json.as_bytes()).unwrap();
        assert_eq!(program.builtins, vec![BuiltinName::Output, BuiltinName::RangeCheck]);
        assert_eq!(program.data.len(), 2);
        assert_eq!(program.main_offset().unwrap(), 0);
        assert_eq!(program.constants.get("a.b.SOME_CONST"), Some(&Felt::from(2u8)));
    }

    #[test]
    fn rejects_unknown_builtin_names() {
        let json = r#"{
            "builtins": ["not_a_real_builtin"],
            "data": [],
            "reference_manager": { "references": [] }
        }"#;
        assert!(Program::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn missing_main_is_reported_lazily() {
        let json = r#"{
            "data": [],
            "reference_manager": { "references": [] }
        }"#;
        let program = Program::from_json(json.as_bytes()).unwrap();
        assert!(matches!(program.main_offset(), Err(RunnerError::MissingMain)));
    }
}
