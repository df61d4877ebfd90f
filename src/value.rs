use std::cmp::Ordering;
use std::fmt;

/// Integer type used for die faces, counts, and integral results.
pub type Int = i64;
/// Float type used once non-integral arithmetic enters an expression.
pub type Float = f64;

/// A numeric result. Arithmetic between two integers stays integral;
/// anything touching a float becomes a float.
#[derive(Debug, Copy, Clone)]
pub enum Value {
    Int(Int),
    Float(Float),
}

impl Value {
    pub const ZERO: Self = Self::Int(0);

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Int(x) => *x == 0,
            Self::Float(x) => x.abs() < Float::EPSILON,
        }
    }

    pub fn as_int(self) -> Int {
        match self {
            Self::Int(x) => x,
            Self::Float(x) => x as Int,
        }
    }

    pub fn as_float(self) -> Float {
        match self {
            Self::Int(x) => x as Float,
            Self::Float(x) => x,
        }
    }

    /// Truncates toward zero, used for die counts and group repetitions.
    pub fn truncated(self) -> Int {
        self.as_int()
    }

    pub fn floor(self) -> Self {
        match self {
            Self::Int(_) => self,
            Self::Float(x) => Self::Int(x.floor() as Int),
        }
    }

    pub fn ceil(self) -> Self {
        match self {
            Self::Int(_) => self,
            Self::Float(x) => Self::Int(x.ceil() as Int),
        }
    }

    pub fn round(self) -> Self {
        match self {
            Self::Int(_) => self,
            Self::Float(x) => Self::Int(x.round() as Int),
        }
    }

    pub fn abs(self) -> Self {
        match self {
            Self::Int(x) => Self::Int(x.abs()),
            Self::Float(x) => Self::Float(x.abs()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::ops::Neg for Value {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self {
            Self::Int(x) => Self::Int(-x),
            Self::Float(x) => Self::Float(-x),
        }
    }
}

macro_rules! value_impl_bin_op {
    ($Name:ident, $fn_name:ident) => {
        impl std::ops::$Name for Value {
            type Output = Self;

            fn $fn_name(self, rhs: Self) -> Self::Output {
                match (self, rhs) {
                    (Self::Int(x), Self::Int(y)) => Self::Int(x.$fn_name(y)),
                    (x, y) => Self::Float(x.as_float().$fn_name(y.as_float())),
                }
            }
        }
    };
}

value_impl_bin_op!(Add, add);
value_impl_bin_op!(Sub, sub);
value_impl_bin_op!(Mul, mul);
value_impl_bin_op!(Rem, rem);

impl std::ops::Div for Value {
    type Output = Self;

    /// Integral when it divides evenly, float otherwise. Callers are
    /// responsible for rejecting a zero divisor first.
    fn div(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Int(x), Self::Int(y)) if y != 0 && x % y == 0 => Self::Int(x / y),
            (x, y) => Self::Float(x.as_float() / y.as_float()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.as_float().eq(&other.as_float())
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.as_float().partial_cmp(&other.as_float())
    }
}

impl From<Int> for Value {
    fn from(x: Int) -> Self {
        Self::Int(x)
    }
}

impl From<Float> for Value {
    fn from(x: Float) -> Self {
        Self::Float(x)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(x) => fmt::Display::fmt(x, f),
            Self::Float(x) => fmt::Debug::fmt(x, f),
        }
    }
}

/// Whether a node's value is an arithmetic total or a signed success count.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ValueType {
    #[default]
    Total,
    Successes,
}

impl ValueType {
    /// Aggregation rule shared by groups and math nodes: the combined result
    /// is success-typed only when every child that rolled dice is
    /// success-typed and at least one child rolled dice.
    pub fn aggregate(children: impl IntoIterator<Item = (ValueType, bool)>) -> ValueType {
        let mut any_rolled = false;
        for (kind, rolled) in children {
            if !rolled {
                continue;
            }
            any_rolled = true;
            if kind != ValueType::Successes {
                return ValueType::Total;
            }
        }
        if any_rolled {
            ValueType::Successes
        } else {
            ValueType::Total
        }
    }
}
