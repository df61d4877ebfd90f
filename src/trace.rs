use crate::table::GroupId;
use crate::value::{Int, Value, ValueType};
use std::fmt;

/// The two die families the roll primitive produces. A fudge die with
/// magnitude `n` has `2n + 1` logical faces spanning `-n..=n`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DieKind {
    Normal,
    Fudge,
}

/// Annotations attached to a rolled die (or a group placeholder standing in
/// for one). `dropped` removes the entry from totals; `extra` marks dice
/// generated by explosions; `macro_` marks dice rolled inside a macro body.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct DieFlags {
    pub critical: bool,
    pub fumble: bool,
    pub success: bool,
    pub failure: bool,
    pub dropped: bool,
    pub extra: bool,
    pub macro_: bool,
}

/// One genuine die outcome.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DieValue {
    pub kind: DieKind,
    pub sides: u32,
    pub value: Int,
    pub flags: DieFlags,
}

impl DieValue {
    pub fn min_face(&self) -> Int {
        match self.kind {
            DieKind::Normal => 1,
            DieKind::Fudge => -(self.sides as Int),
        }
    }

    pub fn max_face(&self) -> Int {
        self.sides as Int
    }
}

/// Operator and structural glyphs interleaved with value entries so that a
/// flat trace can be rendered with correct parenthesization without walking
/// the tree that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    OpenParen,
    CloseParen,
    Comma,
    Text(String),
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("+"),
            Self::Subtract => f.write_str("-"),
            Self::Multiply => f.write_str("*"),
            Self::Divide => f.write_str("/"),
            Self::Negate => f.write_str("-"),
            Self::OpenParen => f.write_str("("),
            Self::CloseParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One element of a node's ordered trace.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Die(DieValue),
    Group {
        value: Value,
        id: GroupId,
        flags: DieFlags,
    },
    Literal(Value),
    Marker(Marker),
}

impl Entry {
    pub fn die(kind: DieKind, sides: u32, value: Int) -> Self {
        Self::Die(DieValue {
            kind,
            sides,
            value,
            flags: DieFlags::default(),
        })
    }

    /// Live entries are the ones that contribute to totals and success
    /// counts: not a marker, not dropped.
    pub fn is_live(&self) -> bool {
        match self {
            Self::Die(d) => !d.flags.dropped,
            Self::Group { flags, .. } => !flags.dropped,
            Self::Literal(_) => true,
            Self::Marker(_) => false,
        }
    }

    pub fn is_value(&self) -> bool {
        !matches!(self, Self::Marker(_))
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Die(d) => Some(Value::Int(d.value)),
            Self::Group { value, .. } => Some(*value),
            Self::Literal(v) => Some(*v),
            Self::Marker(_) => None,
        }
    }

    pub fn set_value(&mut self, new: Value) {
        match self {
            Self::Die(d) => d.value = new.as_int(),
            Self::Group { value, .. } => *value = new,
            Self::Literal(v) => *v = new,
            Self::Marker(_) => {}
        }
    }

    pub fn flags(&self) -> Option<&DieFlags> {
        match self {
            Self::Die(d) => Some(&d.flags),
            Self::Group { flags, .. } => Some(flags),
            _ => None,
        }
    }

    pub fn flags_mut(&mut self) -> Option<&mut DieFlags> {
        match self {
            Self::Die(d) => Some(&mut d.flags),
            Self::Group { flags, .. } => Some(flags),
            _ => None,
        }
    }

    pub fn drop(&mut self) {
        if let Some(flags) = self.flags_mut() {
            flags.dropped = true;
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Die(d) => {
                write!(f, "{}", d.value)?;
                let flags = &d.flags;
                if flags.extra {
                    f.write_str("!")?;
                }
                if flags.dropped {
                    f.write_str("d")?;
                }
                if flags.critical {
                    f.write_str("**")?;
                }
                if flags.fumble {
                    f.write_str("__")?;
                }
                Ok(())
            }
            Self::Group { value, flags, .. } => {
                write!(f, "{}", value)?;
                if flags.dropped {
                    f.write_str("d")?;
                }
                Ok(())
            }
            Self::Literal(v) => write!(f, "{}", v),
            Self::Marker(m) => write!(f, "{}", m),
        }
    }
}

/// Sum of all live entries, ignoring the operator skeleton. Valid for the
/// additive traces mechanics attach to (rolls, groups, advantage sets).
pub fn total(entries: &[Entry]) -> Value {
    entries
        .iter()
        .filter(|e| e.is_live())
        .filter_map(Entry::value)
        .fold(Value::ZERO, |a, b| a + b)
}

/// Signed success count over the live entries: +1 per success (+1 more if
/// also critical), -1 per failure (-1 more if also a fumble).
pub fn success_total(entries: &[Entry]) -> Int {
    entries
        .iter()
        .filter(|e| e.is_live())
        .filter_map(Entry::flags)
        .map(|flags| {
            if flags.success {
                1 + flags.critical as Int
            } else if flags.failure {
                -1 - flags.fumble as Int
            } else {
                0
            }
        })
        .sum()
}

/// Recomputes a mechanic's value from its entries under the given type.
pub fn resum(entries: &[Entry], kind: ValueType) -> Value {
    match kind {
        ValueType::Total => total(entries),
        ValueType::Successes => Value::Int(success_total(entries)),
    }
}
