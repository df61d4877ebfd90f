use crate::error::DiceResult;
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::value::Value;
use std::fmt;
use vec1::Vec1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

impl CompareOp {
    pub fn test(self, x: Value, operand: Value) -> bool {
        match self {
            Self::Equal => x == operand,
            Self::NotEqual => x != operand,
            Self::GreaterThan => x > operand,
            Self::LessThan => x < operand,
            Self::GreaterOrEqual => x >= operand,
            Self::LessOrEqual => x <= operand,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
        })
    }
}

/// One operator + operand predicate. The operand is a full sub-tree, so
/// `reroll(<1d4)` is as valid as `reroll(<3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub op: CompareOp,
    pub operand: Box<Node>,
    pub(crate) out: Outcome,
}

impl Comparison {
    pub fn new(op: CompareOp, operand: Node) -> Self {
        Self {
            op,
            operand: Box::new(operand),
            out: Outcome::default(),
        }
    }

    /// True iff `x` satisfies this predicate. Valid after evaluation.
    pub fn test(&self, x: Value) -> bool {
        self.op.test(x, self.operand.value())
    }
}

impl Evaluate for Comparison {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.operand.evaluate(ctx)?;
        self.out.value = self.operand.value();
        self.out.value_type = self.operand.value_type();
        self.out.entries = self.operand.entries().to_vec();
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.operand.reroll(ctx)?;
        self.out.value = self.operand.value();
        self.out.entries = self.operand.entries().to_vec();
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.operand]
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.operand)
    }
}

/// An OR over one or more comparisons: any match means true. Chained calls
/// of one combinable mechanic merge into a single set by concatenating
/// operand lists, which is why `.explode(=6).explode(=20)` and
/// `.explode(=6,=20)` are the same predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSet {
    pub comparisons: Vec1<Comparison>,
    pub(crate) out: Outcome,
}

impl ComparisonSet {
    pub fn new(comparisons: Vec1<Comparison>) -> Self {
        Self {
            comparisons,
            out: Outcome::default(),
        }
    }

    pub fn single(op: CompareOp, operand: Node) -> Self {
        Self::new(Vec1::new(Comparison::new(op, operand)))
    }

    /// Concatenates another set's comparisons onto this one, in order.
    pub fn merge(&mut self, other: ComparisonSet) {
        for c in other.comparisons {
            self.comparisons.push(c);
        }
    }

    pub fn test(&self, x: Value) -> bool {
        self.comparisons.iter().any(|c| c.test(x))
    }

    /// Evaluates every operand, returning the dice they rolled. Mechanics
    /// call this once before testing dice against the predicate.
    pub(crate) fn prepare(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        for c in self.comparisons.iter_mut() {
            rolls += c.operand.evaluate(ctx)?;
        }
        Ok(rolls)
    }
}

impl Evaluate for ComparisonSet {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        for c in self.comparisons.iter_mut() {
            rolls += c.operand.evaluate(ctx)?;
        }
        self.out.value = self.comparisons.first().operand.value();
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        for c in self.comparisons.iter_mut() {
            rolls += c.operand.reroll(ctx)?;
        }
        self.out.value = self.comparisons.first().operand.value();
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        self.comparisons
            .iter_mut()
            .map(|c| &mut *c.operand)
            .collect()
    }
}

impl fmt::Display for ComparisonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.comparisons.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn prepared(set: &mut ComparisonSet) {
        let config = crate::config::EvalConfig::default();
        let mut entropy = crate::entropy::SequenceEntropy::new([]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        set.prepare(&mut ctx).unwrap();
    }

    #[test]
    fn test_single_comparison() {
        let mut set = ComparisonSet::single(CompareOp::GreaterOrEqual, Node::literal(5));
        prepared(&mut set);
        assert!(set.test(Value::Int(5)));
        assert!(set.test(Value::Int(6)));
        assert!(!set.test(Value::Int(4)));
    }

    #[test]
    fn test_merged_sets_are_an_or() {
        let mut set = ComparisonSet::single(CompareOp::Equal, Node::literal(6));
        set.merge(ComparisonSet::single(CompareOp::Equal, Node::literal(20)));
        prepared(&mut set);
        assert!(set.test(Value::Int(6)));
        assert!(set.test(Value::Int(20)));
        assert!(!set.test(Value::Int(7)));
    }
}
