//! Gated recurrent memory cell
//!
//! One GRU-style layer with a fixed hidden size. The weights are a
//! deterministic sinusoidal projection, not a trained network: there is no
//! backprop path, and every process builds identical matrices.

use ndarray::{Array1, Array2};

/// Hidden state width
pub const HIDDEN_SIZE: usize = 8;

/// Single-layer gated memory cell over `ndarray` vectors
#[derive(Debug, Clone)]
pub struct GatedMemoryCell {
    input_size: usize,
    w_reset: Array2<f64>,
    b_reset: Array1<f64>,
    w_update: Array2<f64>,
    b_update: Array1<f64>,
    w_candidate: Array2<f64>,
    b_candidate: Array1<f64>,
}

impl GatedMemoryCell {
    /// Build the cell for a given input width. Weights are seeded with a
    /// sinusoid over the flat index, scaled by sqrt(2 / (input + hidden)),
    /// with a different phase per matrix.
    pub fn new(input_size: usize) -> Self {
        let scale = (2.0 / (input_size + HIDDEN_SIZE) as f64).sqrt();
        Self {
            input_size,
            w_reset: seeded_matrix(input_size, 0.0, scale),
            b_reset: Array1::zeros(HIDDEN_SIZE),
            w_update: seeded_matrix(input_size, 1.0, scale),
            b_update: Array1::zeros(HIDDEN_SIZE),
            w_candidate: seeded_matrix(input_size, 2.0, scale),
            b_candidate: Array1::zeros(HIDDEN_SIZE),
        }
    }

    /// One recurrence step: blend the previous hidden state with the new
    /// input through reset and update gates.
    pub fn step(&self, h_prev: &Array1<f64>, input: &[f64]) -> Array1<f64> {
        debug_assert_eq!(h_prev.len(), HIDDEN_SIZE);
        debug_assert_eq!(input.len(), self.input_size);

        let concat = Array1::from_iter(h_prev.iter().copied().chain(input.iter().copied()));

        let reset = (self.w_reset.dot(&concat) + &self.b_reset).mapv(sigmoid);
        let update = (self.w_update.dot(&concat) + &self.b_update).mapv(sigmoid);

        let gated_prev = &reset * h_prev;
        let concat_gated =
            Array1::from_iter(gated_prev.iter().copied().chain(input.iter().copied()));
        let candidate = (self.w_candidate.dot(&concat_gated) + &self.b_candidate).mapv(f64::tanh);

        let keep = update.mapv(|z| 1.0 - z);
        &keep * h_prev + &update * &candidate
    }

    /// Fresh zero hidden state
    pub fn initial_state() -> Array1<f64> {
        Array1::zeros(HIDDEN_SIZE)
    }
}

fn seeded_matrix(input_size: usize, phase: f64, scale: f64) -> Array2<f64> {
    let cols = HIDDEN_SIZE + input_size;
    Array2::from_shape_fn((HIDDEN_SIZE, cols), |(i, j)| {
        ((i * cols + j) as f64 * 0.7 + phase).sin() * scale
    })
}

/// Logistic sigmoid with the pre-activation clamped so extreme inputs
/// cannot overflow exp
fn sigmoid(v: f64) -> f64 {
    let v = v.clamp(-500.0, 500.0);
    1.0 / (1.0 + (-v).exp())
}
