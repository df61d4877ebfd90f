use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{Entry, Marker};
use crate::value::ValueType;
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    fn marker(self) -> Marker {
        match self {
            Self::Add => Marker::Add,
            Self::Subtract => Marker::Subtract,
            Self::Multiply => Marker::Multiply,
            Self::Divide => Marker::Divide,
        }
    }
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.marker(), f)
    }
}

/// Binary arithmetic over two sub-trees. The trace is both children's
/// traces joined by the operator marker; the value type follows the same
/// aggregation rule groups use.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: MathOp,
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub(crate) out: Outcome,
}

impl Binary {
    pub fn new(op: MathOp, left: Node, right: Node) -> Self {
        Self {
            op,
            left: Box::new(left),
            right: Box::new(right),
            out: Outcome::default(),
        }
    }

    fn combine(&mut self, left_rolls: u32, right_rolls: u32) -> DiceResult<()> {
        let l = self.left.value();
        let r = self.right.value();
        self.out.value = match self.op {
            MathOp::Add => l + r,
            MathOp::Subtract => l - r,
            MathOp::Multiply => l * r,
            MathOp::Divide => {
                if r.is_zero() {
                    return Err(DiceError::DivideByZero);
                }
                l / r
            }
        };
        self.out.value_type = ValueType::aggregate([
            (self.left.value_type(), left_rolls > 0),
            (self.right.value_type(), right_rolls > 0),
        ]);
        self.out.entries.clear();
        self.out.entries.extend_from_slice(self.left.entries());
        self.out.entries.push(Entry::Marker(self.op.marker()));
        self.out.entries.extend_from_slice(self.right.entries());
        Ok(())
    }
}

impl Evaluate for Binary {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let left_rolls = self.left.evaluate(ctx)?;
        let right_rolls = self.right.evaluate(ctx)?;
        self.combine(left_rolls, right_rolls)?;
        Ok(left_rolls + right_rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let left_rolls = self.left.reroll(ctx)?;
        let right_rolls = self.right.reroll(ctx)?;
        self.combine(left_rolls, right_rolls)?;
        Ok(left_rolls + right_rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.left, &mut self.right]
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.left, self.op, self.right)
    }
}

/// Arithmetic negation of a sub-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub value: Box<Node>,
    pub(crate) out: Outcome,
}

impl Unary {
    pub fn negate(value: Node) -> Self {
        Self {
            value: Box::new(value),
            out: Outcome::default(),
        }
    }

    fn refresh(&mut self) {
        self.out.value = -self.value.value();
        self.out.value_type = self.value.value_type();
        self.out.entries.clear();
        self.out.entries.push(Entry::Marker(Marker::Negate));
        self.out.entries.push(Entry::Marker(Marker::OpenParen));
        self.out.entries.extend_from_slice(self.value.entries());
        self.out.entries.push(Entry::Marker(Marker::CloseParen));
    }
}

impl Evaluate for Unary {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.value.evaluate(ctx)?;
        self.refresh();
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.value.reroll(ctx)?;
        self.refresh();
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.value]
    }
}

impl fmt::Display for Unary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-({})", self.value)
    }
}
