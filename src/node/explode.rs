use crate::error::DiceResult;
use crate::eval::EvalContext;
use crate::node::compare::ComparisonSet;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{self, DieValue, Entry, Marker};
use crate::value::{Int, Value};
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExplodeMode {
    /// Extras append as separate entries joined by add markers.
    Explode,
    /// Extras fold their values into the original entry.
    Compound,
    /// Like explode, but each extra loses 1 and an unconditioned chain
    /// steps d100 to d20 to d6.
    Penetrate,
}

impl ExplodeMode {
    fn name(self) -> &'static str {
        match self {
            Self::Explode => "explode",
            Self::Compound => "compound",
            Self::Penetrate => "penetrate",
        }
    }
}

/// Exploding dice: every live die that satisfies the predicate (default:
/// its maximum face) earns a fresh die of the same size, tested in turn.
/// A chain stops silently at the per-chain reroll cap; the dice budget
/// stays fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct Explode {
    pub expr: Box<Node>,
    pub mode: ExplodeMode,
    pub cond: Option<ComparisonSet>,
    pub(crate) out: Outcome,
}

impl Explode {
    pub fn new(expr: Node, mode: ExplodeMode, cond: Option<ComparisonSet>) -> Self {
        Self {
            expr: Box::new(expr),
            mode,
            cond,
            out: Outcome::default(),
        }
    }

    fn should_explode(&self, die: &DieValue) -> bool {
        match &self.cond {
            Some(cond) => cond.test(Value::Int(die.value)),
            None => die.value == die.max_face(),
        }
    }

    fn next_sides(&self, current: u32) -> u32 {
        if self.mode == ExplodeMode::Penetrate && self.cond.is_none() {
            match current {
                100 => 20,
                20 => 6,
                s => s,
            }
        } else {
            current
        }
    }

    fn apply(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let source = self.expr.entries().to_vec();
        let mut entries = Vec::with_capacity(source.len());
        let mut extras = 0;

        for entry in source {
            let Entry::Die(die) = entry else {
                entries.push(entry);
                continue;
            };
            entries.push(Entry::Die(die));
            if die.flags.dropped {
                continue;
            }
            let base_index = entries.len() - 1;

            let mut current = die;
            let mut chain = 0u32;
            while self.should_explode(&current) {
                if chain >= ctx.config().max_rerolls {
                    // Deliberately non-fatal: the chain just stops.
                    break;
                }
                let fresh = ctx.roll_die(self.next_sides(current.sides), die.kind)?;
                chain += 1;
                extras += 1;

                let penalty = (self.mode == ExplodeMode::Penetrate) as Int;
                match self.mode {
                    ExplodeMode::Compound => {
                        if let Entry::Die(base) = &mut entries[base_index] {
                            base.value += fresh.value;
                            base.flags.extra = true;
                        }
                    }
                    ExplodeMode::Explode | ExplodeMode::Penetrate => {
                        let mut extra = fresh;
                        extra.value -= penalty;
                        extra.flags.extra = true;
                        entries.push(Entry::Marker(Marker::Add));
                        entries.push(Entry::Die(extra));
                    }
                }
                // Continuation always tests the undiminished fresh face.
                current = fresh;
            }
        }

        self.out.value_type = self.expr.value_type();
        self.out.value = trace::resum(&entries, self.out.value_type);
        self.out.entries = entries;
        Ok(extras)
    }
}

impl Evaluate for Explode {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = self.expr.evaluate(ctx)?;
        if let Some(cond) = &mut self.cond {
            rolls += cond.prepare(ctx)?;
        }
        rolls += self.apply(ctx)?;
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = self.expr.reroll(ctx)?;
        rolls += self.apply(ctx)?;
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut children = vec![&mut *self.expr];
        if let Some(cond) = &mut self.cond {
            children.extend(cond.comparisons.iter_mut().map(|c| &mut *c.operand));
        }
        children
    }
}

impl fmt::Display for Explode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.expr, self.mode.name())?;
        if let Some(cond) = &self.cond {
            write!(f, "{}", cond)?;
        }
        f.write_str(")")
    }
}
