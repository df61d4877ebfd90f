use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::table::{GroupId, GroupSnapshot};
use crate::trace::{self, DieFlags, Entry, Marker};
use crate::value::{Value, ValueType};
use std::fmt;

/// A repeated multi-roll: `times{member, member, ...}`. Members are frozen
/// on first use and re-triggered per iteration via the reroll protocol, so
/// `2{(1d6)d8}` resolves the inner `1d6` once and redraws only the `d8`s.
/// Every realized (iteration, member) pair is snapshotted into the side
/// table so later mechanics can re-trigger or expand that exact iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub times: Option<Box<Node>>,
    pub members: Vec<Node>,
    resolved_times: Option<i64>,
    member_rolled: Vec<bool>,
    ids: Vec<GroupId>,
    pub(crate) out: Outcome,
}

impl Group {
    pub fn new(times: Option<Node>, members: Vec<Node>) -> Self {
        Self {
            times: times.map(Box::new),
            members,
            resolved_times: None,
            member_rolled: Vec::new(),
            ids: Vec::new(),
            out: Outcome::default(),
        }
    }

    pub(crate) fn owns(&self, id: GroupId) -> bool {
        self.ids.contains(&id)
    }

    /// Re-triggers the single iteration snapshot behind `id`: rerolls the
    /// member that produced it and refreezes the snapshot in place.
    pub(crate) fn redo(&mut self, id: GroupId, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let member_index = ctx.table.group(id).member;
        let member = &mut self.members[member_index];
        let rolls = member.reroll(ctx)?;

        let snapshot = ctx.table.group_mut(id);
        snapshot.value = member.value();
        snapshot.value_type = member.value_type();
        snapshot.entries = member.entries().to_vec();
        let value = snapshot.value;

        // Keep our own trace and total consistent with the new iteration.
        for entry in &mut self.out.entries {
            if matches!(entry, Entry::Group { id: eid, .. } if *eid == id) {
                entry.set_value(value);
            }
        }
        // Member values already carry success counts when success-typed, so
        // the group total is a plain sum either way.
        self.out.value = trace::total(&self.out.entries);
        Ok(rolls)
    }

    fn realize(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let times = self.resolved_times.unwrap_or(1);
        // Iterations are bounded like dice even when no member rolls any,
        // so the repetition count cannot become an unmetered loop.
        let max = ctx.config().max_dice;
        if times > max as i64 {
            return Err(DiceError::TooManyDice { max });
        }
        self.out.entries.clear();
        self.ids.clear();
        self.member_rolled = vec![false; self.members.len()];

        if times <= 0 || self.members.is_empty() {
            self.out.entries.push(Entry::Literal(Value::ZERO));
            self.out.value = Value::ZERO;
            self.out.value_type = ValueType::Total;
            return Ok(0);
        }

        let mut rolls = 0;
        for iteration in 0..times {
            if iteration > 0 {
                self.out.entries.push(Entry::Marker(Marker::Add));
            }
            self.out.entries.push(Entry::Marker(Marker::OpenParen));
            for (i, member) in self.members.iter_mut().enumerate() {
                if i > 0 {
                    self.out.entries.push(Entry::Marker(Marker::Comma));
                }
                let member_rolls = member.reroll(ctx)?;
                rolls += member_rolls;
                if member_rolls > 0 {
                    self.member_rolled[i] = true;
                }

                let id = ctx.table.push_group(GroupSnapshot {
                    member: i,
                    value: member.value(),
                    value_type: member.value_type(),
                    entries: member.entries().to_vec(),
                });
                self.ids.push(id);
                self.out.entries.push(Entry::Group {
                    value: member.value(),
                    id,
                    flags: DieFlags::default(),
                });
            }
            self.out.entries.push(Entry::Marker(Marker::CloseParen));
        }

        self.out.value_type = ValueType::aggregate(
            self.members
                .iter()
                .zip(&self.member_rolled)
                .map(|(m, &rolled)| (m.value_type(), rolled)),
        );
        self.out.value = trace::total(&self.out.entries);
        Ok(rolls)
    }
}

impl Evaluate for Group {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        if let Some(times) = &mut self.times {
            rolls += times.evaluate(ctx)?;
            self.resolved_times = Some(times.value().truncated());
        } else {
            self.resolved_times = Some(1);
        }
        rolls += self.realize(ctx)?;
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        // The repetition count is frozen; only the iterations redo.
        self.realize(ctx)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut children: Vec<&mut Node> = Vec::new();
        if let Some(times) = &mut self.times {
            children.push(times);
        }
        children.extend(self.members.iter_mut());
        children
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(times) = &self.times {
            write!(f, "{}", times)?;
        }
        f.write_str("{")?;
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", member)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::entropy::SequenceEntropy;
    use crate::node::roll::Roll;
    use crate::trace::DieKind;

    fn context<'a>(
        config: &'a EvalConfig,
        entropy: &'a mut SequenceEntropy,
    ) -> EvalContext<'a> {
        EvalContext::new(config, entropy, None)
    }

    #[test]
    fn test_two_iterations_sum_and_snapshot() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([2, 5]);
        let mut ctx = context(&config, &mut entropy);

        let mut node = Node::from(Group::new(
            Some(Node::literal(2)),
            vec![Node::dice(1, 6)],
        ));
        let rolls = node.evaluate(&mut ctx).unwrap();
        assert_eq!(rolls, 2);
        // Faces 3 and 6, one group entry per iteration.
        assert_eq!(node.value(), Value::Int(9));
        let groups: Vec<_> = node
            .entries()
            .iter()
            .filter(|e| matches!(e, Entry::Group { .. }))
            .collect();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_members_freeze_on_first_use() {
        let config = EvalConfig::default();
        // The inner 1d4 count die draws once (a 2); both iterations then
        // redraw exactly two d8.
        let mut entropy = SequenceEntropy::new([1, 0, 1, 2, 3]);
        let mut ctx = context(&config, &mut entropy);

        let inner = Node::from(Roll::new(
            Node::dice(1, 4),
            Node::literal(8),
            DieKind::Normal,
        ));
        let mut node = Node::from(Group::new(Some(Node::literal(2)), vec![inner]));
        let rolls = node.evaluate(&mut ctx).unwrap();
        // 1 count die + 2 per iteration.
        assert_eq!(rolls, 5);
        // Iteration one: 1+2, iteration two: 3+4.
        assert_eq!(node.value(), Value::Int(10));
    }

    #[test]
    fn test_zero_times_is_a_single_zero() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new(Vec::new());
        let mut ctx = context(&config, &mut entropy);

        let mut node = Node::from(Group::new(
            Some(Node::literal(0)),
            vec![Node::dice(3, 6)],
        ));
        let rolls = node.evaluate(&mut ctx).unwrap();
        assert_eq!(rolls, 0);
        assert_eq!(node.value(), Value::ZERO);
        assert_eq!(node.entries().len(), 1);
    }

    #[test]
    fn test_rolless_iterations_still_hit_the_dice_limit() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new(Vec::new());
        let mut ctx = context(&config, &mut entropy);

        // No member rolls a die, so only the iteration bound can stop it.
        let mut node = Node::from(Group::new(
            Some(Node::literal(9_999_999_999i64)),
            vec![Node::literal(3)],
        ));
        assert_eq!(
            node.evaluate(&mut ctx),
            Err(DiceError::TooManyDice { max: 1000 })
        );
    }

    #[test]
    fn test_redo_refreezes_one_iteration() {
        let config = EvalConfig::default();
        let mut entropy = SequenceEntropy::new([0, 1, 5]);
        let mut ctx = context(&config, &mut entropy);

        let mut node = Node::from(Group::new(
            Some(Node::literal(2)),
            vec![Node::dice(1, 6)],
        ));
        node.evaluate(&mut ctx).unwrap();
        assert_eq!(node.value(), Value::Int(3));

        // Re-trigger the first iteration only; the second keeps its 2.
        let id = node
            .entries()
            .iter()
            .find_map(|e| match e {
                Entry::Group { id, .. } => Some(*id),
                _ => None,
            })
            .unwrap();
        let rolls = node.reroll_group(id, &mut ctx).unwrap();
        assert_eq!(rolls, 1);
        assert_eq!(node.value(), Value::Int(8));
        assert_eq!(ctx.table.group(id).value, Value::Int(6));
    }
}
