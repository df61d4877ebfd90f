use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::compare::ComparisonSet;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{self, DieFlags, Entry, Marker};
use crate::value::Value;
use std::fmt;

/// One reroll band: replace while the predicate matches, at most `max`
/// times per die chain (`None` defers to the configured per-chain cap).
#[derive(Debug, Clone, PartialEq)]
pub struct RerollBand {
    pub cond: ComparisonSet,
    pub max: Option<u32>,
}

impl RerollBand {
    pub fn new(cond: ComparisonSet, max: Option<u32>) -> Self {
        Self { cond, max }
    }
}

/// Bounded conditional rerolls. A matching live die is dropped and replaced
/// by a fresh one chained after an add marker; the replacement is re-tested
/// until the band's counter or the per-chain cap runs out. Group entries
/// re-trigger their side-table iteration instead of drawing a primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Reroll {
    pub expr: Box<Node>,
    pub bands: Vec<RerollBand>,
    pub(crate) out: Outcome,
}

impl Reroll {
    pub fn new(expr: Node, bands: Vec<RerollBand>) -> Self {
        Self {
            expr: Box::new(expr),
            bands,
            out: Outcome::default(),
        }
    }

    fn apply(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let source = self.expr.entries().to_vec();
        let mut entries: Vec<Entry> = Vec::with_capacity(source.len());
        let mut replacements = 0;

        for entry in source {
            if !entry.is_value() || !entry.is_live() {
                entries.push(entry);
                continue;
            }
            entries.push(entry);

            for band_index in 0..self.bands.len() {
                let cap = self.bands[band_index]
                    .max
                    .unwrap_or(ctx.config().max_rerolls)
                    .min(ctx.config().max_rerolls);
                let mut chain = 0u32;
                loop {
                    let last = entries
                        .last()
                        .and_then(Entry::value)
                        .unwrap_or(Value::ZERO);
                    if chain >= cap || !self.bands[band_index].cond.test(last) {
                        break;
                    }
                    let replacement = match entries.last() {
                        Some(Entry::Die(old)) => {
                            let fresh = ctx.roll_die(old.sides, old.kind)?;
                            Entry::Die(fresh)
                        }
                        Some(Entry::Group { id, .. }) => {
                            let id = *id;
                            replacements += self.expr.reroll_group(id, ctx)?;
                            Entry::Group {
                                value: ctx.table.group(id).value,
                                id,
                                flags: DieFlags::default(),
                            }
                        }
                        _ => break,
                    };
                    if let Some(old) = entries.last_mut() {
                        old.drop();
                    }
                    entries.push(Entry::Marker(Marker::Add));
                    entries.push(replacement);
                    if matches!(entries.last(), Some(Entry::Die(_))) {
                        replacements += 1;
                    }
                    chain += 1;
                }
            }
        }

        self.out.value_type = self.expr.value_type();
        self.out.value = trace::resum(&entries, self.out.value_type);
        self.out.entries = entries;
        Ok(replacements)
    }
}

impl Evaluate for Reroll {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        // Explicit counts outside the configured range are an error; only
        // the implicit per-chain cap clamps silently.
        for band in &self.bands {
            if let Some(max) = band.max {
                if max == 0 || max > ctx.config().max_rerolls {
                    return Err(DiceError::BadRerollCount {
                        max: ctx.config().max_rerolls,
                    });
                }
            }
        }
        let mut rolls = self.expr.evaluate(ctx)?;
        for band in &mut self.bands {
            rolls += band.cond.prepare(ctx)?;
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
        for band in &mut self.bands {
            children.extend(band.cond.comparisons.iter_mut().map(|c| &mut *c.operand));
        }
        children
    }
}

impl fmt::Display for Reroll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        for band in &self.bands {
            match band.max {
                Some(1) => write!(f, ".rerollOnce({})", band.cond)?,
                Some(n) => write!(f, ".rerollN({},{})", n, band.cond)?,
                None => write!(f, ".reroll({})", band.cond)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::entropy::SequenceEntropy;
    use crate::node::compare::CompareOp;
    use crate::node::Node;

    fn eval(node: &mut Node, draws: &[u32]) -> u32 {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new(draws.to_vec());
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        node.evaluate(&mut ctx).unwrap()
    }

    fn below(n: i64) -> ComparisonSet {
        ComparisonSet::single(CompareOp::LessThan, Node::literal(n))
    }

    #[test]
    fn test_reroll_replaces_until_predicate_clears() {
        // Faces 1, 2, 5: two replacements before a keeper.
        let mut node = Node::from(Reroll::new(
            Node::dice(1, 6),
            vec![RerollBand::new(below(3), None)],
        ));
        let rolls = eval(&mut node, &[0, 1, 4]);
        assert_eq!(rolls, 3);
        assert_eq!(node.value(), Value::Int(5));
        let dropped = node
            .entries()
            .iter()
            .filter(|e| e.flags().is_some_and(|f| f.dropped))
            .count();
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_reroll_once_stops_after_one() {
        // Faces 1, 2: the replacement still matches but the band is spent.
        let mut node = Node::from(Reroll::new(
            Node::dice(1, 6),
            vec![RerollBand::new(below(3), Some(1))],
        ));
        let rolls = eval(&mut node, &[0, 1]);
        assert_eq!(rolls, 2);
        assert_eq!(node.value(), Value::Int(2));
    }

    #[test]
    fn test_reroll_chain_respects_global_cap() {
        let mut config = EvalConfig::default();
        config.max_rerolls = 5;
        let mut node = Node::from(Reroll::new(
            Node::dice(1, 6),
            vec![RerollBand::new(below(7), None)],
        ));
        // Predicate always matches; the chain must stop at the cap.
        let mut entropy = SequenceEntropy::new([2]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        let rolls = node.evaluate(&mut ctx).unwrap();
        assert_eq!(rolls, 6);
        assert_eq!(node.value(), Value::Int(3));
    }

    #[test]
    fn test_explicit_count_above_cap_is_an_error() {
        let mut config = EvalConfig::default();
        config.max_rerolls = 5;
        let mut node = Node::from(Reroll::new(
            Node::dice(1, 6),
            vec![RerollBand::new(below(2), Some(6))],
        ));
        let mut entropy = SequenceEntropy::new([0]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        let err = node.evaluate(&mut ctx).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRerollCount);
    }

    #[test]
    fn test_untouched_dice_pass_through() {
        let mut node = Node::from(Reroll::new(
            Node::dice(2, 6),
            vec![RerollBand::new(below(2), None)],
        ));
        // Faces 4 and 5 never match.
        let rolls = eval(&mut node, &[3, 4]);
        assert_eq!(rolls, 2);
        assert_eq!(node.value(), Value::Int(9));
    }
}
