use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{self, Entry, Marker};
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeepDir {
    Highest,
    Lowest,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeepAction {
    Keep,
    Drop,
}

/// Keep or drop a counted slice of the live dice by rank. The complement is
/// flagged dropped, never removed, so the trace stays complete.
#[derive(Debug, Clone, PartialEq)]
pub struct Keep {
    pub expr: Box<Node>,
    pub amount: Box<Node>,
    pub dir: KeepDir,
    pub action: KeepAction,
    pub(crate) out: Outcome,
}

impl Keep {
    pub fn new(expr: Node, amount: Node, action: KeepAction, dir: KeepDir) -> Self {
        Self {
            expr: Box::new(expr),
            amount: Box::new(amount),
            dir,
            action,
            out: Outcome::default(),
        }
    }

    fn apply(&mut self) -> DiceResult<()> {
        let amount = self.amount.value().truncated();
        if amount < 0 {
            return Err(DiceError::NegativeDice);
        }
        let amount = amount as usize;

        let mut entries = self.expr.entries().to_vec();
        // Live die and group positions, ranked low to high; ties keep trace
        // order. Literals are not rankable since they cannot be dropped.
        let mut ranked: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].is_live() && entries[i].flags().is_some())
            .collect();
        ranked.sort_by(|&a, &b| {
            entries[a]
                .value()
                .partial_cmp(&entries[b].value())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let live = ranked.len();
        let to_drop: Vec<usize> = match (self.action, self.dir) {
            // Keeping the n highest drops everything below them.
            (KeepAction::Keep, KeepDir::Highest) => {
                ranked.drain(..live.saturating_sub(amount)).collect()
            }
            (KeepAction::Keep, KeepDir::Lowest) => ranked.drain(amount.min(live)..).collect(),
            (KeepAction::Drop, KeepDir::Highest) => {
                ranked.drain(live.saturating_sub(amount)..).collect()
            }
            (KeepAction::Drop, KeepDir::Lowest) => ranked.drain(..amount.min(live)).collect(),
        };
        for i in to_drop {
            entries[i].drop();
        }

        self.out.value_type = self.expr.value_type();
        self.out.value = trace::resum(&entries, self.out.value_type);
        self.out.entries = entries;
        Ok(())
    }

    fn name(&self) -> &'static str {
        match (self.action, self.dir) {
            (KeepAction::Keep, KeepDir::Highest) => "keepHighest",
            (KeepAction::Keep, KeepDir::Lowest) => "keepLowest",
            (KeepAction::Drop, KeepDir::Highest) => "dropHighest",
            (KeepAction::Drop, KeepDir::Lowest) => "dropLowest",
        }
    }
}

impl Evaluate for Keep {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = self.expr.evaluate(ctx)?;
        rolls += self.amount.evaluate(ctx)?;
        self.apply()?;
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.expr.reroll(ctx)?;
        self.apply()?;
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.expr, &mut self.amount]
    }
}

impl fmt::Display for Keep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.expr, self.name(), self.amount)
    }
}

/// Roll the whole underlying expression twice; the higher (advantage) or
/// lower (disadvantage) total wins, ties going to the first roll. The
/// losing set is bulk-dropped and trails the winner after an add marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Advantage {
    pub expr: Box<Node>,
    pub disadvantage: bool,
    pub(crate) out: Outcome,
}

impl Advantage {
    pub fn new(expr: Node, disadvantage: bool) -> Self {
        Self {
            expr: Box::new(expr),
            disadvantage,
            out: Outcome::default(),
        }
    }

    fn roll_pair(&mut self, ctx: &mut EvalContext<'_>, first_rolls: u32) -> DiceResult<u32> {
        let first_value = self.expr.value();
        let first_entries = self.expr.entries().to_vec();
        let value_type = self.expr.value_type();

        let second_rolls = self.expr.reroll(ctx)?;
        let second_value = self.expr.value();
        let second_entries = self.expr.entries().to_vec();

        let second_wins = if self.disadvantage {
            second_value < first_value
        } else {
            second_value > first_value
        };
        let (winner_value, winner, mut loser) = if second_wins {
            (second_value, second_entries, first_entries)
        } else {
            (first_value, first_entries, second_entries)
        };
        for entry in &mut loser {
            entry.drop();
        }

        self.out.value = winner_value;
        self.out.value_type = value_type;
        self.out.entries = winner;
        self.out.entries.push(Entry::Marker(Marker::Add));
        self.out.entries.extend(loser);
        Ok(first_rolls + second_rolls)
    }
}

impl Evaluate for Advantage {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let first_rolls = self.expr.evaluate(ctx)?;
        self.roll_pair(ctx, first_rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let first_rolls = self.expr.reroll(ctx)?;
        self.roll_pair(ctx, first_rolls)
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

impl fmt::Display for Advantage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.disadvantage {
            "disadvantage"
        } else {
            "advantage"
        };
        write!(f, "{}.{}()", self.expr, name)
    }
}
