use crate::config::{EvalConfig, STANDARD_SIDES};
use crate::entropy::Entropy;
use crate::error::{DiceError, DiceResult};
use crate::node::Node;
use crate::registry::{self, DiceFunction, MacroFn, Registry, Scope};
use crate::table::SideTable;
use crate::trace::{DieFlags, DieKind, DieValue, Entry};
use crate::value::{Int, Value, ValueType};
use std::sync::Arc;

/// Everything one root evaluation owns: the config view, the entropy
/// source, depth and dice-budget accounting, and the private side table.
pub struct EvalContext<'a> {
    config: &'a EvalConfig,
    entropy: &'a mut dyn Entropy,
    roll_functions: Option<&'a Registry>,
    depth: u32,
    rolls: u32,
    pub(crate) table: SideTable,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(
        config: &'a EvalConfig,
        entropy: &'a mut dyn Entropy,
        roll_functions: Option<&'a Registry>,
    ) -> Self {
        Self {
            config,
            entropy,
            roll_functions,
            depth: 0,
            rolls: 0,
            table: SideTable::new(),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        self.config
    }

    /// Dice rolled so far by this evaluation.
    pub fn rolls(&self) -> u32 {
        self.rolls
    }

    pub(crate) fn descend(&mut self) -> DiceResult<()> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            Err(DiceError::RecursionDepthExceeded {
                max: self.config.max_depth,
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn charge(&mut self) -> DiceResult<()> {
        self.rolls += 1;
        if self.rolls > self.config.max_dice {
            Err(DiceError::TooManyDice {
                max: self.config.max_dice,
            })
        } else {
            Ok(())
        }
    }

    /// Validates a requested die size against the configured limits.
    pub(crate) fn check_sides(&self, sides: Int, kind: DieKind) -> DiceResult<u32> {
        if sides < 1 || sides > self.config.max_sides as Int {
            return Err(DiceError::BadSides {
                sides,
                max: self.config.max_sides,
            });
        }
        let sides = sides as u32;
        if self.config.standard_only
            && kind == DieKind::Normal
            && !STANDARD_SIDES.contains(&sides)
        {
            return Err(DiceError::WrongSides { sides });
        }
        Ok(sides)
    }

    /// Rolls one die without modulo bias: raw draws at or above
    /// `(u32::MAX / faces) * faces` are rejected and redrawn, then the
    /// survivor reduces mod `faces`. Fudge dice map onto the signed range
    /// `-sides..=sides` the same way via their `2*sides + 1` logical faces.
    /// Charges the dice budget and appends the accepted raw to the roll
    /// history.
    pub fn roll_die(&mut self, sides: u32, kind: DieKind) -> DiceResult<DieValue> {
        self.charge()?;

        let value = if let Some(over) = &self.config.roll_override {
            let value = over(sides, kind);
            // Record the raw a real draw would have produced, keeping the
            // history replayable regardless of how the face was chosen.
            let raw = match kind {
                DieKind::Normal => (value - 1) as u32,
                DieKind::Fudge => (value + sides as Int) as u32,
            };
            self.table.record_raw(raw);
            value
        } else {
            let faces = match kind {
                DieKind::Normal => sides,
                DieKind::Fudge => 2 * sides + 1,
            };
            let limit = (u32::MAX / faces) * faces;
            let raw = loop {
                let raw = self.entropy.draw();
                if raw < limit {
                    break raw;
                }
            };
            self.table.record_raw(raw);
            match kind {
                DieKind::Normal => (raw % faces) as Int + 1,
                DieKind::Fudge => (raw % faces) as Int - sides as Int,
            }
        };

        let mut die = DieValue {
            kind,
            sides,
            value,
            flags: DieFlags::default(),
        };
        die.flags.fumble = value == die.min_face();
        die.flags.critical = value == die.max_face();
        tracing::trace!(sides, ?kind, value, "rolled die");
        Ok(die)
    }

    pub(crate) fn resolve_function(
        &self,
        name: &str,
        scope: Scope,
    ) -> DiceResult<Arc<DiceFunction>> {
        let builtin = crate::builtins::table();
        match self.roll_functions {
            Some(per_roll) => registry::resolve_layered(
                name,
                scope,
                &[per_roll, &self.config.functions, builtin],
            ),
            None => registry::resolve_layered(name, scope, &[&self.config.functions, builtin]),
        }
    }

    pub(crate) fn resolve_macro(&self, name: &str) -> DiceResult<MacroFn> {
        self.config
            .macros
            .resolve(name)
            .ok_or_else(|| DiceError::InvalidMacro {
                name: name.to_string(),
            })
    }
}

/// Everything needed to persist a result and later reconstruct an
/// equivalent one without re-parsing source text.
#[derive(Debug, Clone)]
pub struct Recipe {
    /// Normalized expression text, rendered from the tree.
    pub expression: String,
    /// Every accepted pre-reduction draw, in order.
    pub roll_history: Vec<u32>,
    /// Every macro result, in order.
    pub macro_history: Vec<Value>,
}

/// The result of evaluating a root expression.
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub value: Value,
    pub value_type: ValueType,
    /// Flat annotated trace of every die, grouping, and marker.
    pub entries: Vec<Entry>,
    /// Total dice rolled, extras included.
    pub rolls: u32,
    pub recipe: Recipe,
}

/// Pairs a configuration with an optional per-roll function layer. The
/// per-roll layer resolves ahead of the configuration layer, which resolves
/// ahead of the built-ins.
#[derive(Debug)]
pub struct Evaluator<'a> {
    config: &'a EvalConfig,
    roll_functions: Option<Registry>,
}

impl<'a> Evaluator<'a> {
    pub fn new(config: &'a EvalConfig) -> Self {
        Self {
            config,
            roll_functions: None,
        }
    }

    pub fn with_functions(mut self, functions: Registry) -> Self {
        self.roll_functions = Some(functions);
        self
    }

    pub fn evaluate(&self, root: &mut Node, entropy: &mut dyn Entropy) -> DiceResult<Evaluated> {
        let expression = root.to_string();
        tracing::debug!(%expression, "evaluating roll");
        let mut ctx = EvalContext::new(self.config, entropy, self.roll_functions.as_ref());
        let rolls = root.evaluate(&mut ctx)?;
        debug_assert_eq!(rolls, ctx.rolls());
        Ok(Evaluated {
            value: root.value(),
            value_type: root.value_type(),
            entries: root.entries().to_vec(),
            rolls,
            recipe: Recipe {
                expression,
                roll_history: ctx.table.roll_history,
                macro_history: ctx.table.macro_history,
            },
        })
    }
}

/// Evaluates `root` under `config`, drawing entropy from `entropy`.
/// The root is evaluated exactly once; call again for a fresh roll.
pub fn evaluate(
    root: &mut Node,
    config: &EvalConfig,
    entropy: &mut dyn Entropy,
) -> DiceResult<Evaluated> {
    Evaluator::new(config).evaluate(root, entropy)
}
