pub mod call;
pub mod compare;
pub mod explode;
pub mod group;
pub mod keep;
pub mod literal;
pub mod math;
pub mod reroll;
pub mod roll;
pub mod sort;
pub mod success;

use crate::error::DiceResult;
use crate::eval::EvalContext;
use crate::table::GroupId;
use crate::trace::{DieKind, Entry};
use crate::value::{Int, Value, ValueType};
use std::fmt;

pub use call::{CallContext, CallResult, FunctionCall, MacroCall};
pub use compare::{CompareOp, Comparison, ComparisonSet};
pub use explode::{Explode, ExplodeMode};
pub use group::Group;
pub use keep::{Advantage, Keep, KeepAction, KeepDir};
pub use literal::Literal;
pub use math::{Binary, MathOp, Unary};
pub use reroll::{Reroll, RerollBand};
pub use roll::Roll;
pub use sort::{Sort, SortOrder};
pub use success::{Critical, Success};

/// The result slots every node carries: its value, how that value is read,
/// its flat annotated trace, and whether it has been evaluated yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub value: Value,
    pub value_type: ValueType,
    pub evaluated: bool,
    pub entries: Vec<Entry>,
}

/// The per-variant half of the evaluation protocol. `evaluate` runs the
/// node's full logic, sub-trees included; `reroll` re-runs only the parts
/// that produce dice, leaving resolved sub-trees frozen. Depth accounting
/// and the evaluated flag live in [`Node`]'s wrappers, not here.
pub(crate) trait Evaluate {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32>;
    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32>;
    fn outcome(&self) -> &Outcome;
    fn outcome_mut(&mut self) -> &mut Outcome;
    fn children_mut(&mut self) -> Vec<&mut Node>;
}

/// One node of a dice expression. The set of variants is closed: built-in
/// mechanics compose into their dedicated variants, and everything else a
/// registry can add flows through [`FunctionCall`] and [`MacroCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Literal),
    Roll(Roll),
    Group(Group),
    Binary(Binary),
    Unary(Unary),
    Keep(Keep),
    Advantage(Advantage),
    Explode(Explode),
    Reroll(Reroll),
    Sort(Sort),
    Success(Success),
    Critical(Critical),
    Comparison(Comparison),
    ComparisonSet(ComparisonSet),
    FunctionCall(FunctionCall),
    MacroCall(MacroCall),
}

macro_rules! dispatch {
    ($self:expr, $inner:pat => $body:expr) => {
        match $self {
            Node::Literal($inner) => $body,
            Node::Roll($inner) => $body,
            Node::Group($inner) => $body,
            Node::Binary($inner) => $body,
            Node::Unary($inner) => $body,
            Node::Keep($inner) => $body,
            Node::Advantage($inner) => $body,
            Node::Explode($inner) => $body,
            Node::Reroll($inner) => $body,
            Node::Sort($inner) => $body,
            Node::Success($inner) => $body,
            Node::Critical($inner) => $body,
            Node::Comparison($inner) => $body,
            Node::ComparisonSet($inner) => $body,
            Node::FunctionCall($inner) => $body,
            Node::MacroCall($inner) => $body,
        }
    };
}

impl Node {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(Literal::new(value))
    }

    pub fn dice(count: Int, sides: Int) -> Self {
        Self::Roll(Roll::new(
            Self::literal(count),
            Self::literal(sides),
            DieKind::Normal,
        ))
    }

    /// Runs this node's full logic, guarding recursion depth; returns the
    /// dice it rolled.
    pub fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        ctx.descend()?;
        let rolls = dispatch!(self, inner => Evaluate::evaluate(inner, ctx));
        ctx.ascend();
        let rolls = rolls?;
        self.outcome_mut().evaluated = true;
        Ok(rolls)
    }

    /// Redraws this node's dice with everything already resolved left
    /// frozen. On a node that has never been evaluated this is a plain
    /// evaluation.
    pub fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        if !self.is_evaluated() {
            return self.evaluate(ctx);
        }
        ctx.descend()?;
        let rolls = dispatch!(self, inner => Evaluate::reroll(inner, ctx));
        ctx.ascend();
        rolls
    }

    pub fn value(&self) -> Value {
        self.outcome().value
    }

    pub fn value_type(&self) -> ValueType {
        self.outcome().value_type
    }

    pub fn entries(&self) -> &[Entry] {
        &self.outcome().entries
    }

    pub fn is_evaluated(&self) -> bool {
        self.outcome().evaluated
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, Self::Comparison(_) | Self::ComparisonSet(_))
    }

    fn outcome(&self) -> &Outcome {
        dispatch!(self, inner => Evaluate::outcome(inner))
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        dispatch!(self, inner => Evaluate::outcome_mut(inner))
    }

    pub(crate) fn children_mut(&mut self) -> Vec<&mut Node> {
        dispatch!(self, inner => Evaluate::children_mut(inner))
    }

    /// Finds the group that owns `id` anywhere under this node and
    /// re-triggers that iteration. Returns the dice rolled doing so.
    pub(crate) fn reroll_group(
        &mut self,
        id: GroupId,
        ctx: &mut EvalContext<'_>,
    ) -> DiceResult<u32> {
        if let Self::Group(group) = self {
            if group.owns(id) {
                return group.redo(id, ctx);
            }
        }
        let mut rolls = 0;
        for child in self.children_mut() {
            rolls += child.reroll_group(id, ctx)?;
        }
        Ok(rolls)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, inner => fmt::Display::fmt(inner, f))
    }
}

macro_rules! node_from {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Node {
                fn from(inner: $variant) -> Self {
                    Self::$variant(inner)
                }
            }
        )+
    };
}

node_from!(
    Literal,
    Roll,
    Group,
    Binary,
    Unary,
    Keep,
    Advantage,
    Explode,
    Reroll,
    Sort,
    Success,
    Critical,
    Comparison,
    ComparisonSet,
    FunctionCall,
    MacroCall,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::entropy::SequenceEntropy;
    use crate::error::ErrorCode;

    #[test]
    fn test_evaluate_marks_the_whole_tree() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([3, 4]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = Node::from(Binary::new(
            MathOp::Add,
            Node::dice(1, 6),
            Node::dice(1, 6),
        ));
        assert!(!node.is_evaluated());
        let rolls = node.evaluate(&mut ctx).unwrap();
        assert_eq!(rolls, 2);
        assert!(node.is_evaluated());
        assert_eq!(node.value(), Value::Int(9));
    }

    #[test]
    fn test_depth_guard_trips_on_deep_trees() {
        let mut config = EvalConfig::default();
        config.max_depth = 3;
        let mut entropy = SequenceEntropy::new([]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = Node::literal(1);
        for _ in 0..4 {
            node = Node::from(Unary::negate(node));
        }
        let err = node.evaluate(&mut ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecursionDepthExceeded);
    }

    #[test]
    fn test_reroll_before_evaluate_is_an_evaluate() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([5]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = Node::dice(1, 6);
        node.reroll(&mut ctx).unwrap();
        assert!(node.is_evaluated());
        assert_eq!(node.value(), Value::Int(6));
    }

    #[test]
    fn test_reroll_keeps_resolved_counts_frozen() {
        let config = EvalConfig::default();
        // (1d4)d6: count die draws 3 (a 4), then four d6.
        let mut entropy = SequenceEntropy::new([3, 0, 1, 2, 3, 5, 5, 5, 5]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = Node::from(Roll::new(
            Node::dice(1, 4),
            Node::literal(6),
            DieKind::Normal,
        ));
        let rolls = node.evaluate(&mut ctx).unwrap();
        assert_eq!(rolls, 5);
        assert_eq!(node.value(), Value::Int(10));

        // The count stays 4; only the d6 set redraws.
        let rolls = node.reroll(&mut ctx).unwrap();
        assert_eq!(rolls, 4);
        assert_eq!(node.value(), Value::Int(24));
    }

    #[test]
    fn test_display_renders_normalized_text() {
        let node = Node::from(Binary::new(
            MathOp::Add,
            Node::dice(2, 20),
            Node::literal(5),
        ));
        assert_eq!(node.to_string(), "2d20+5");
    }
}
