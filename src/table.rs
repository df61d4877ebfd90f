use crate::trace::Entry;
use crate::value::{Value, ValueType};

/// Typed handle into the group snapshot arena. Scoped to one evaluation;
/// handles from one side table are meaningless against another.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GroupId(pub(crate) u32);

/// Frozen record of one realized group iteration member: enough to re-render
/// it, plus the member index the owning group needs to re-trigger it.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub member: usize,
    pub value: Value,
    pub value_type: ValueType,
    pub entries: Vec<Entry>,
}

/// Per-evaluation scratch state: the accepted-raw roll history and macro
/// value history (the reconstruction recipe), and the group snapshot arena.
/// Created fresh when a root begins evaluation, never shared between
/// concurrent evaluations.
#[derive(Debug, Default)]
pub struct SideTable {
    pub(crate) roll_history: Vec<u32>,
    pub(crate) macro_history: Vec<Value>,
    groups: Vec<GroupSnapshot>,
}

impl SideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_raw(&mut self, raw: u32) {
        self.roll_history.push(raw);
    }

    pub fn record_macro(&mut self, value: Value) {
        self.macro_history.push(value);
    }

    pub fn push_group(&mut self, snapshot: GroupSnapshot) -> GroupId {
        let id = GroupId(self.groups.len() as u32);
        self.groups.push(snapshot);
        id
    }

    pub fn group(&self, id: GroupId) -> &GroupSnapshot {
        &self.groups[id.0 as usize]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut GroupSnapshot {
        &mut self.groups[id.0 as usize]
    }

    pub fn roll_history(&self) -> &[u32] {
        &self.roll_history
    }

    pub fn macro_history(&self) -> &[Value] {
        &self.macro_history
    }
}
