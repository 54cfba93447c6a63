// src/random.rs

use rand::Rng;

/// Source of uniform draws in [0, 1) used for exploration.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

/// Adapts any `rand` generator.
pub struct RngSource<R: Rng>(pub R);

impl<R: Rng> RandomSource for RngSource<R> {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Always returns the same value. `FixedDraw(0.0)` forces exploration,
/// `FixedDraw(1.0)` disables it.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub f64);

impl RandomSource for FixedDraw {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

/// Replays a fixed sequence, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct SequenceDraw {
    values: Vec<f64>,
    pos: usize,
}

impl SequenceDraw {
    pub fn new(values: Vec<f64>) -> Self {
        SequenceDraw { values, pos: 0 }
    }
}

impl RandomSource for SequenceDraw {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 1.0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v
    }
}
