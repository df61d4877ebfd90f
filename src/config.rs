use crate::registry::{MacroRegistry, Registry};
use crate::trace::DieKind;
use crate::value::Int;
use std::fmt;
use std::sync::Arc;

/// Die sizes accepted when [`EvalConfig::standard_only`] is set. Fudge dice
/// are exempt from the check.
pub const STANDARD_SIDES: [u32; 8] = [2, 4, 6, 8, 10, 12, 20, 100];

/// Replaces the entropy-driven roll of a single die, for deterministic
/// tests and replay. Receives (sides, kind), returns the face value.
pub type RollOverride = Arc<dyn Fn(u32, DieKind) -> Int + Send + Sync>;

/// Evaluation limits and extension points. Read-only for the duration of
/// one evaluation; build it up front and thread it through every call.
#[derive(Clone)]
pub struct EvalConfig {
    /// Hard cap on dice rolled by one root evaluation.
    pub max_dice: u32,
    /// Largest allowed die size.
    pub max_sides: u32,
    /// Maximum expression nesting depth.
    pub max_depth: u32,
    /// Cap on replacement dice within one explode/reroll chain. Exhaustion
    /// is the single non-fatal limit: the chain just stops.
    pub max_rerolls: u32,
    /// Reject non-canonical die sizes (see [`STANDARD_SIDES`]).
    pub standard_only: bool,
    pub roll_override: Option<RollOverride>,
    pub functions: Registry,
    pub macros: MacroRegistry,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_dice: 1000,
            max_sides: 10_000,
            max_depth: 20,
            max_rerolls: 100,
            standard_only: false,
            roll_override: None,
            functions: Registry::new(),
            macros: MacroRegistry::new(),
        }
    }
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for EvalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalConfig")
            .field("max_dice", &self.max_dice)
            .field("max_sides", &self.max_sides)
            .field("max_depth", &self.max_depth)
            .field("max_rerolls", &self.max_rerolls)
            .field("standard_only", &self.standard_only)
            .field("roll_override", &self.roll_override.as_ref().map(|_| ".."))
            .finish_non_exhaustive()
    }
}
