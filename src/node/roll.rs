use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{self, DieKind, Entry};
use crate::value::ValueType;
use std::fmt;

/// `count` dice of `sides` sides. Both are sub-trees resolved once at first
/// evaluation and cached, so `(1d6)d8` rolls the `1d6` exactly once; a
/// reroll redraws only this node's own dice.
#[derive(Debug, Clone, PartialEq)]
pub struct Roll {
    pub count: Box<Node>,
    pub sides: Box<Node>,
    pub kind: DieKind,
    resolved: Option<(u32, u32)>,
    pub(crate) out: Outcome,
}

impl Roll {
    pub fn new(count: Node, sides: Node, kind: DieKind) -> Self {
        Self {
            count: Box::new(count),
            sides: Box::new(sides),
            kind,
            resolved: None,
            out: Outcome::default(),
        }
    }

    fn roll_set(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        // Resolved is set before the first roll; reroll on an unevaluated
        // node goes through evaluate instead.
        let Some((count, sides)) = self.resolved else {
            return self.evaluate(ctx);
        };
        self.out.entries.clear();
        for _ in 0..count {
            let die = ctx.roll_die(sides, self.kind)?;
            self.out.entries.push(Entry::Die(die));
        }
        self.out.value = trace::total(&self.out.entries);
        self.out.value_type = ValueType::Total;
        Ok(count)
    }
}

impl Evaluate for Roll {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = self.count.evaluate(ctx)?;
        rolls += self.sides.evaluate(ctx)?;

        let count = self.count.value().truncated();
        if count < 0 {
            return Err(DiceError::NegativeDice);
        }
        // Checked before the narrowing cast: a count past the budget can
        // never roll, so it is fatal here rather than one die at a time.
        let max = ctx.config().max_dice;
        if count > max as i64 {
            return Err(DiceError::TooManyDice { max });
        }
        let sides = ctx.check_sides(self.sides.value().truncated(), self.kind)?;
        self.resolved = Some((count as u32, sides));

        rolls += self.roll_set(ctx)?;
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        self.roll_set(ctx)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        vec![&mut self.count, &mut self.sides]
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.count)?;
        match self.kind {
            DieKind::Normal => write!(f, "{}", self.sides),
            DieKind::Fudge => write!(f, "F.{}", self.sides),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::entropy::SequenceEntropy;
    use crate::value::Value;

    fn fudge(count: i64, sides: i64) -> Node {
        Node::from(Roll::new(
            Node::literal(count),
            Node::literal(sides),
            DieKind::Fudge,
        ))
    }

    #[test]
    fn test_count_past_the_budget_is_fatal_before_any_roll() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([0]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        // 2^32 + 1 would wrap to 1 under a bare narrowing cast.
        let mut node = Node::from(Roll::new(
            Node::literal(4_294_967_297i64),
            Node::literal(6),
            DieKind::Normal,
        ));
        assert_eq!(
            node.evaluate(&mut ctx),
            Err(DiceError::TooManyDice { max: 1000 })
        );
        assert_eq!(ctx.rolls(), 0);
    }

    #[test]
    fn test_negative_count_is_fatal() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([0]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = Node::from(Roll::new(
            Node::literal(-1),
            Node::literal(6),
            DieKind::Normal,
        ));
        assert_eq!(node.evaluate(&mut ctx), Err(DiceError::NegativeDice));
    }

    #[test]
    fn test_fudge_faces_span_the_signed_range() {
        let config = EvalConfig::default();
        // dF.1 maps over 3 faces: raw 0 -> -1, 1 -> 0, 2 -> +1.
        let mut entropy = SequenceEntropy::new([0, 1, 2]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = fudge(3, 1);
        let rolls = node.evaluate(&mut ctx).unwrap();
        assert_eq!(rolls, 3);
        assert_eq!(node.value(), Value::ZERO);

        let dice: Vec<_> = node
            .entries()
            .iter()
            .filter_map(|e| match e {
                Entry::Die(d) => Some(*d),
                _ => None,
            })
            .collect();
        assert_eq!(
            dice.iter().map(|d| d.value).collect::<Vec<_>>(),
            vec![-1, 0, 1]
        );
        // The signed extremes carry the fumble and critical flags.
        assert!(dice[0].flags.fumble && !dice[0].flags.critical);
        assert!(!dice[1].flags.fumble && !dice[1].flags.critical);
        assert!(dice[2].flags.critical && !dice[2].flags.fumble);
    }

    #[test]
    fn test_fudge_rejection_band_covers_all_faces() {
        let config = EvalConfig::default();
        // dF.3 has 7 faces and u32::MAX % 7 == 3, so the top 4 raws are
        // redrawn: u32::MAX - 3 bounces, u32::MAX - 4 reduces to face +3.
        let mut entropy = SequenceEntropy::new([u32::MAX - 3, u32::MAX - 4]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut node = fudge(1, 3);
        node.evaluate(&mut ctx).unwrap();
        assert_eq!(node.value(), Value::Int(3));
        assert_eq!(ctx.table.roll_history(), &[u32::MAX - 4]);
    }

    #[test]
    fn test_out_of_range_sides_are_fatal() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([0]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut zero = Node::dice(1, 0);
        assert_eq!(
            zero.evaluate(&mut ctx),
            Err(DiceError::BadSides {
                sides: 0,
                max: 10_000
            })
        );
        let mut huge = Node::dice(1, 10_001);
        assert_eq!(
            huge.evaluate(&mut ctx),
            Err(DiceError::BadSides {
                sides: 10_001,
                max: 10_000
            })
        );
    }

    #[test]
    fn test_standard_only_rejects_odd_sizes_but_not_fudge() {
        let mut config = EvalConfig::default();
        config.standard_only = true;
        let mut entropy = SequenceEntropy::new([0, 0]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);

        let mut d7 = Node::dice(1, 7);
        assert_eq!(
            d7.evaluate(&mut ctx),
            Err(DiceError::WrongSides { sides: 7 })
        );
        // Fudge sizes are exempt from the canonical-size check.
        let mut f3 = fudge(1, 3);
        assert!(f3.evaluate(&mut ctx).is_ok());
    }
}
