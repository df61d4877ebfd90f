use crate::error::DiceResult;
use crate::eval::EvalContext;
use crate::node::compare::ComparisonSet;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{self, Entry};
use crate::value::{Value, ValueType};
use std::fmt;

/// Converts a pool to success counting. Every live die (or group result)
/// is tested against the success predicate, and optionally the failure
/// predicate; the value becomes the signed success count. Face-derived
/// critical and fumble flags are cleared here so a natural 20 does not
/// count double unless `Critical` re-declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    pub expr: Box<Node>,
    pub success: ComparisonSet,
    pub failure: Option<ComparisonSet>,
    pub(crate) out: Outcome,
}

impl Success {
    pub fn new(expr: Node, success: ComparisonSet, failure: Option<ComparisonSet>) -> Self {
        Self {
            expr: Box::new(expr),
            success,
            failure,
            out: Outcome::default(),
        }
    }

    fn apply(&mut self) {
        let mut entries = self.expr.entries().to_vec();
        for entry in entries.iter_mut().filter(|e| e.is_live()) {
            let Some(value) = entry.value() else { continue };
            let Some(flags) = entry.flags_mut() else { continue };
            flags.critical = false;
            flags.fumble = false;
            flags.success = self.success.test(value);
            flags.failure = !flags.success
                && self.failure.as_ref().map_or(false, |f| f.test(value));
        }
        self.out.value = Value::Int(trace::success_total(&entries));
        self.out.value_type = ValueType::Successes;
        self.out.entries = entries;
    }
}

impl Evaluate for Success {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = self.expr.evaluate(ctx)?;
        rolls += self.success.prepare(ctx)?;
        if let Some(failure) = &mut self.failure {
            rolls += failure.prepare(ctx)?;
        }
        self.apply();
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.expr.reroll(ctx)?;
        self.apply();
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.expr]
    }
}

impl fmt::Display for Success {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.success({})", self.expr, self.success)?;
        if let Some(failure) = &self.failure {
            write!(f, ".failure({})", failure)?;
        }
        Ok(())
    }
}

/// Re-declares which faces are critical hits and fumbles. Supersedes the
/// face-derived flags, and when the pool underneath is already counting
/// successes the count is recomputed so crits weigh double.
#[derive(Debug, Clone, PartialEq)]
pub struct Critical {
    pub expr: Box<Node>,
    pub crit: Option<ComparisonSet>,
    pub fumble: Option<ComparisonSet>,
    pub(crate) out: Outcome,
}

impl Critical {
    pub fn new(expr: Node, crit: Option<ComparisonSet>, fumble: Option<ComparisonSet>) -> Self {
        Self {
            expr: Box::new(expr),
            crit,
            fumble,
            out: Outcome::default(),
        }
    }

    fn apply(&mut self) {
        let mut entries = self.expr.entries().to_vec();
        for entry in entries.iter_mut().filter(|e| e.is_live()) {
            let Some(value) = entry.value() else { continue };
            let Some(flags) = entry.flags_mut() else { continue };
            if let Some(crit) = &self.crit {
                flags.critical = crit.test(value);
            }
            if let Some(fumble) = &self.fumble {
                flags.fumble = fumble.test(value);
            }
        }
        let value_type = self.expr.value_type();
        self.out.value = trace::resum(&entries, value_type);
        self.out.value_type = value_type;
        self.out.entries = entries;
    }
}

impl Evaluate for Critical {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = self.expr.evaluate(ctx)?;
        if let Some(crit) = &mut self.crit {
            rolls += crit.prepare(ctx)?;
        }
        if let Some(fumble) = &mut self.fumble {
            rolls += fumble.prepare(ctx)?;
        }
        self.apply();
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.expr.reroll(ctx)?;
        self.apply();
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.expr]
    }
}

impl fmt::Display for Critical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(crit) = &self.crit {
            write!(f, ".critical({})", crit)?;
        }
        if let Some(fumble) = &self.fumble {
            write!(f, ".fumble({})", fumble)?;
        }
        Ok(())
    }
}
