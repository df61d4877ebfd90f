use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::call::CallContext;
use crate::node::Node;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where a call may attach. `Global`, `Basic`, and `Group` are the call-site
/// scopes; `Roll` (= basic + group) and `All` are registration shorthands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Scope {
    Global,
    Basic,
    Group,
    Roll,
    All,
}

impl Scope {
    /// Whether a registration under `self` serves a call made at `call`.
    pub fn accepts(self, call: Scope) -> bool {
        match self {
            Self::All => true,
            Self::Roll => matches!(call, Self::Basic | Self::Group),
            s => s == call,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::Basic => "basic",
            Self::Group => "group",
            Self::Roll => "roll",
            Self::All => "all",
        })
    }
}

/// Ordered phase slots. A call's timing fixes where it splices into the
/// modifier pipeline regardless of the order it was written in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Timing {
    First,
    BeforeExplode,
    Explode,
    AfterExplode,
    BeforeReroll,
    Reroll,
    AfterReroll,
    BeforeKeep,
    Keep,
    AfterKeep,
    BeforeSuccess,
    Success,
    AfterSuccess,
    BeforeCrit,
    Crit,
    AfterCrit,
    BeforeSort,
    Sort,
    AfterSort,
    Last,
}

/// How same-name calls within one timing slot interact.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum CallBehavior {
    /// Each call executes in order.
    #[default]
    Sequential,
    /// Calls merge into one whose argument lists concatenate in order, so
    /// `.explode(=6).explode(=20)` becomes `.explode(=6,=20)`.
    CombineArguments,
}

/// Builds the composed node for a resolved call: the attached expression
/// wrapped in whatever the mechanic needs. Built-ins use this to emit their
/// dedicated node variants; entries without one wrap as a
/// [`FunctionCall`](crate::node::call::FunctionCall).
pub type ComposeFn = fn(Box<Node>, Vec<Node>) -> DiceResult<Node>;

/// Runtime body for calls that stay `FunctionCall` nodes.
pub type CallFn =
    Arc<dyn Fn(&mut CallContext<'_>, &mut EvalContext<'_>) -> DiceResult<()> + Send + Sync>;

/// Pre-execution validation, fired per timing slot with the read-only
/// pending-call list before any combination happens.
pub type ValidateFn = fn(&[PendingCall]) -> DiceResult<()>;

/// What validators get to see about each not-yet-combined call.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub name: String,
    pub timing: Timing,
    pub args: usize,
    /// True when any argument is a comparison, i.e. the call is conditional.
    pub conditional: bool,
}

/// One registered function or mechanic. Built-ins and user extensions use
/// the identical shape; nothing downstream can tell them apart.
#[derive(Clone)]
pub struct DiceFunction {
    pub name: String,
    pub scope: Scope,
    pub timing: Timing,
    pub behavior: CallBehavior,
    pub compose: Option<ComposeFn>,
    pub call: Option<CallFn>,
    pub validate: Option<ValidateFn>,
}

impl DiceFunction {
    pub fn new(name: impl Into<String>, scope: Scope, timing: Timing) -> Self {
        Self {
            name: name.into().to_lowercase(),
            scope,
            timing,
            behavior: CallBehavior::default(),
            compose: None,
            call: None,
            validate: None,
        }
    }

    pub fn combining(mut self) -> Self {
        self.behavior = CallBehavior::CombineArguments;
        self
    }

    pub fn composing(mut self, compose: ComposeFn) -> Self {
        self.compose = Some(compose);
        self
    }

    pub fn calling(mut self, call: CallFn) -> Self {
        self.call = Some(call);
        self
    }

    pub fn validating(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }
}

impl fmt::Debug for DiceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiceFunction")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("timing", &self.timing)
            .field("behavior", &self.behavior)
            .finish_non_exhaustive()
    }
}

/// Name-and-scope keyed function table. One layer of the three-deep
/// resolution order (per-roll, per-configuration, built-in).
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: HashMap<String, Vec<Arc<DiceFunction>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: DiceFunction) {
        self.entries
            .entry(function.name.clone())
            .or_default()
            .push(Arc::new(function));
    }

    pub fn resolve(&self, name: &str, scope: Scope) -> Option<Arc<DiceFunction>> {
        let name = name.to_lowercase();
        self.entries
            .get(&name)?
            .iter()
            .find(|f| f.scope.accepts(scope))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves across priority layers; the first hit wins.
pub(crate) fn resolve_layered(
    name: &str,
    scope: Scope,
    layers: &[&Registry],
) -> DiceResult<Arc<DiceFunction>> {
    for layer in layers {
        if let Some(found) = layer.resolve(name, scope) {
            tracing::trace!(name, %scope, "resolved dice function");
            return Ok(found);
        }
    }
    Err(DiceError::NoSuchFunction {
        name: name.to_string(),
        scope,
    })
}

/// Body of a user macro: computes a value against the call context, rolling
/// through the evaluation context if it needs dice.
pub type MacroFn =
    Arc<dyn Fn(&mut CallContext<'_>, &mut EvalContext<'_>) -> DiceResult<Value> + Send + Sync>;

#[derive(Default, Clone)]
pub struct MacroRegistry {
    entries: HashMap<String, MacroFn>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, body: MacroFn) {
        self.entries.insert(name.into().to_lowercase(), body);
    }

    pub fn resolve(&self, name: &str) -> Option<MacroFn> {
        self.entries.get(&name.to_lowercase()).cloned()
    }
}

impl fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
