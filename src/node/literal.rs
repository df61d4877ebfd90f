use crate::error::DiceResult;
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::Entry;
use crate::value::Value;
use std::fmt;

/// A fixed numeric leaf. Rolls nothing; its trace is a single literal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: Value,
    pub(crate) out: Outcome,
}

impl Literal {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            out: Outcome::default(),
        }
    }
}

impl Evaluate for Literal {
    fn evaluate(&mut self, _ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        self.out.value = self.value;
        self.out.entries = vec![Entry::Literal(self.value)];
        Ok(0)
    }

    fn reroll(&mut self, _ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        Ok(0)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        Vec::new()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
