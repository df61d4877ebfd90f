use rand::RngCore;

/// Source of raw 32-bit entropy for the fair-die-roll algorithm. Any
/// [`rand::RngCore`] qualifies; the rejection sampling in
/// [`EvalContext::roll_die`](crate::eval::EvalContext::roll_die) consumes
/// draws from here.
pub trait Entropy {
    fn draw(&mut self) -> u32;
}

impl<R: RngCore> Entropy for R {
    fn draw(&mut self) -> u32 {
        self.next_u32()
    }
}

/// Deterministic entropy replaying an exact sequence of pre-reduction draws,
/// for tests and for reconstructing a persisted result from its roll
/// history. Wraps around when exhausted so a short script can feed a long
/// roll without panicking mid-evaluation.
#[derive(Debug, Clone)]
pub struct SequenceEntropy {
    draws: Vec<u32>,
    next: usize,
}

impl SequenceEntropy {
    pub fn new(draws: impl Into<Vec<u32>>) -> Self {
        Self {
            draws: draws.into(),
            next: 0,
        }
    }

    /// Number of draws consumed so far.
    pub fn consumed(&self) -> usize {
        self.next
    }
}

impl Entropy for SequenceEntropy {
    fn draw(&mut self) -> u32 {
        if self.draws.is_empty() {
            return 0;
        }
        let raw = self.draws[self.next % self.draws.len()];
        self.next += 1;
        raw
    }
}
