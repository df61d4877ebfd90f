use crate::error::DiceResult;
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::{Entry, Marker};
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Reorders the live values inside each run of the trace while leaving the
/// operator and grouping skeleton exactly where it was. A run is a maximal
/// stretch of dice or group results joined only by `+` markers (dice sets
/// and explode chains); any other marker ends it, literals are pinned in
/// place, and dropped dice hold their positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub expr: Box<Node>,
    pub order: SortOrder,
    pub(crate) out: Outcome,
}

impl Sort {
    pub fn new(expr: Node, order: SortOrder) -> Self {
        Self {
            expr: Box::new(expr),
            order,
            out: Outcome::default(),
        }
    }

    fn apply(&mut self) {
        let mut entries = self.expr.entries().to_vec();
        let order = self.order;

        let mut run: Vec<usize> = Vec::new();
        let mut i = 0;
        while i <= entries.len() {
            let boundary = match entries.get(i) {
                None => true,
                Some(Entry::Marker(m)) => !matches!(m, Marker::Add),
                // Flat modifiers never sort; they split the runs around
                // them.
                Some(Entry::Literal(_)) => true,
                Some(_) => {
                    run.push(i);
                    false
                }
            };
            if boundary {
                sort_run(&mut entries, &run, order);
                run.clear();
            }
            i += 1;
        }

        self.out.value = self.expr.value();
        self.out.value_type = self.expr.value_type();
        self.out.entries = entries;
    }
}

/// Stable sort of the live entries at `positions`, writing them back into
/// the same positions.
fn sort_run(entries: &mut [Entry], positions: &[usize], order: SortOrder) {
    let live: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|&i| entries[i].is_live())
        .collect();
    if live.len() < 2 {
        return;
    }
    let mut values: Vec<Entry> = live.iter().map(|&i| entries[i].clone()).collect();
    values.sort_by(|a, b| {
        let cmp = a
            .value()
            .partial_cmp(&b.value())
            .unwrap_or(std::cmp::Ordering::Equal);
        match order {
            SortOrder::Ascending => cmp,
            SortOrder::Descending => cmp.reverse(),
        }
    });
    for (i, entry) in live.into_iter().zip(values) {
        entries[i] = entry;
    }
}

impl Evaluate for Sort {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let rolls = self.expr.evaluate(ctx)?;
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

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            SortOrder::Ascending => write!(f, "{}.sort()", self.expr),
            SortOrder::Descending => write!(f, "{}.sort(desc)", self.expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::entropy::SequenceEntropy;
    use crate::node::Node;
    use crate::value::Value;

    fn eval(node: &mut Node, draws: &[u32]) {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new(draws.to_vec());
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        node.evaluate(&mut ctx).unwrap();
    }

    fn faces(node: &Node) -> Vec<i64> {
        node.entries()
            .iter()
            .filter(|e| e.is_value())
            .filter_map(Entry::value)
            .map(Value::as_int)
            .collect()
    }

    #[test]
    fn test_sort_ascending_within_a_roll() {
        let mut node = Node::from(Sort::new(Node::dice(4, 6), SortOrder::Ascending));
        eval(&mut node, &[4, 1, 5, 0]);
        assert_eq!(faces(&node), vec![1, 2, 5, 6]);
        assert_eq!(node.value(), Value::Int(14));
    }

    #[test]
    fn test_sort_descending() {
        let mut node = Node::from(Sort::new(Node::dice(3, 6), SortOrder::Descending));
        eval(&mut node, &[0, 5, 2]);
        assert_eq!(faces(&node), vec![6, 3, 1]);
    }

    #[test]
    fn test_sort_preserves_operator_skeleton() {
        use crate::node::math::{Binary, MathOp};
        // (3d6) * (literal 2): the multiply boundary splits the runs, so
        // the dice sort among themselves and the 2 stays put.
        let mut node = Node::from(Sort::new(
            Node::from(Binary::new(MathOp::Multiply, Node::dice(3, 6), Node::literal(2))),
            SortOrder::Ascending,
        ));
        eval(&mut node, &[4, 0, 2]);
        assert_eq!(faces(&node), vec![1, 3, 5, 2]);
    }

    #[test]
    fn test_sort_never_moves_an_added_flat_modifier() {
        use crate::node::math::{Binary, MathOp};
        // 3d6 + 2: the flat 2 is pinned even though `+` joins it to the
        // dice.
        let mut node = Node::from(Sort::new(
            Node::from(Binary::new(MathOp::Add, Node::dice(3, 6), Node::literal(2))),
            SortOrder::Ascending,
        ));
        eval(&mut node, &[4, 0, 2]);
        assert_eq!(faces(&node), vec![1, 3, 5, 2]);
        assert_eq!(node.value(), Value::Int(11));
    }

    #[test]
    fn test_sort_leaves_dropped_dice_in_place() {
        use crate::node::keep::{Keep, KeepAction, KeepDir};
        let mut node = Node::from(Sort::new(
            Node::from(Keep::new(
                Node::dice(3, 6),
                Node::literal(1),
                KeepAction::Drop,
                KeepDir::Lowest,
            )),
            SortOrder::Ascending,
        ));
        // Faces 5, 1, 3; the 1 is dropped and must not move.
        eval(&mut node, &[4, 0, 2]);
        assert_eq!(faces(&node), vec![3, 1, 5]);
        assert!(!node.entries()[1].is_live());
    }
}
