//! Optimization algorithms
//!
//! One optimizer instance drives every parameter of the network. Each
//! parameter tensor is addressed by a stable slot index, so stateful
//! optimizers keep independent moment buffers per parameter while sharing
//! a single timestep across the whole update.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optimizer trait for weight updates.
pub trait Optimizer: Send + Sync {
    /// Advance the shared timestep. Called once per batch, before the
    /// per-parameter updates.
    fn begin_step(&mut self);

    /// Update a matrix parameter given its gradient.
    fn update_matrix(&mut self, slot: usize, param: &mut Array2<f64>, gradient: &Array2<f64>);

    /// Update a vector parameter given its gradient.
    fn update_vector(&mut self, slot: usize, param: &mut Array1<f64>, gradient: &Array1<f64>);

    /// Reset optimizer state (for a new training run).
    fn reset(&mut self);

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

/// Stochastic Gradient Descent with optional momentum.
#[derive(Clone, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    #[serde(skip)]
    velocity_m: HashMap<usize, Array2<f64>>,
    #[serde(skip)]
    velocity_v: HashMap<usize, Array1<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            velocity_m: HashMap::new(),
            velocity_v: HashMap::new(),
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for Sgd {
    fn begin_step(&mut self) {}

    fn update_matrix(&mut self, slot: usize, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        if self.momentum > 0.0 {
            let v = self
                .velocity_m
                .entry(slot)
                .or_insert_with(|| Array2::zeros(param.dim()));
            *v = &*v * self.momentum - gradient * self.learning_rate;
            *param = &*param + &*v;
        } else {
            *param = &*param - &(gradient * self.learning_rate);
        }
    }

    fn update_vector(&mut self, slot: usize, param: &mut Array1<f64>, gradient: &Array1<f64>) {
        if self.momentum > 0.0 {
            let v = self
                .velocity_v
                .entry(slot)
                .or_insert_with(|| Array1::zeros(param.len()));
            *v = &*v * self.momentum - gradient * self.learning_rate;
            *param = &*param + &*v;
        } else {
            *param = &*param - &(gradient * self.learning_rate);
        }
    }

    fn reset(&mut self) {
        self.velocity_m.clear();
        self.velocity_v.clear();
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

/// Adam optimizer (Adaptive Moment Estimation).
#[derive(Clone, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    #[serde(skip)]
    t: usize,
    #[serde(skip)]
    first_m: HashMap<usize, Array2<f64>>,
    #[serde(skip)]
    second_m: HashMap<usize, Array2<f64>>,
    #[serde(skip)]
    first_v: HashMap<usize, Array1<f64>>,
    #[serde(skip)]
    second_v: HashMap<usize, Array1<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            first_m: HashMap::new(),
            second_m: HashMap::new(),
            first_v: HashMap::new(),
            second_v: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update_matrix(&mut self, slot: usize, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let t = self.t.max(1);
        let m = self
            .first_m
            .entry(slot)
            .or_insert_with(|| Array2::zeros(param.dim()));
        *m = &*m * self.beta1 + gradient * (1.0 - self.beta1);
        let v = self
            .second_m
            .entry(slot)
            .or_insert_with(|| Array2::zeros(param.dim()));
        *v = &*v * self.beta2 + &(gradient * gradient) * (1.0 - self.beta2);

        // Bias-corrected estimates
        let m_hat = &self.first_m[&slot] / (1.0 - self.beta1.powi(t as i32));
        let v_hat = &self.second_m[&slot] / (1.0 - self.beta2.powi(t as i32));

        *param = &*param - &(&m_hat * self.learning_rate / &(v_hat.mapv(f64::sqrt) + self.epsilon));
    }

    fn update_vector(&mut self, slot: usize, param: &mut Array1<f64>, gradient: &Array1<f64>) {
        let t = self.t.max(1);
        let m = self
            .first_v
            .entry(slot)
            .or_insert_with(|| Array1::zeros(param.len()));
        *m = &*m * self.beta1 + gradient * (1.0 - self.beta1);
        let v = self
            .second_v
            .entry(slot)
            .or_insert_with(|| Array1::zeros(param.len()));
        *v = &*v * self.beta2 + &(gradient * gradient) * (1.0 - self.beta2);

        // Bias-corrected estimates
        let m_hat = &self.first_v[&slot] / (1.0 - self.beta1.powi(t as i32));
        let v_hat = &self.second_v[&slot] / (1.0 - self.beta2.powi(t as i32));

        *param = &*param - &(&m_hat * self.learning_rate / &(v_hat.mapv(f64::sqrt) + self.epsilon));
    }

    fn reset(&mut self) {
        self.t = 0;
        self.first_m.clear();
        self.second_m.clear();
        self.first_v.clear();
        self.second_v.clear();
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sgd_update() {
        let mut optimizer = Sgd::new(0.01);
        let mut weights = Array2::ones((3, 2));
        let gradients = Array2::ones((3, 2));
        optimizer.begin_step();
        optimizer.update_matrix(0, &mut weights, &gradients);

        assert_relative_eq!(weights[[0, 0]], 0.99, epsilon = 1e-10);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut optimizer = Sgd::new(0.1).with_momentum(0.9);
        let mut weights = Array2::ones((1, 1));
        let gradients = Array2::ones((1, 1));

        optimizer.begin_step();
        optimizer.update_matrix(0, &mut weights, &gradients);
        let first_step = 1.0 - weights[[0, 0]];

        optimizer.begin_step();
        optimizer.update_matrix(0, &mut weights, &gradients);
        let second_step = 1.0 - first_step - weights[[0, 0]];

        // Velocity carries over: the second step is larger
        assert!(second_step > first_step);
    }

    #[test]
    fn test_adam_first_step_magnitude() {
        // Bias correction makes the first step ~learning_rate regardless
        // of gradient scale.
        let mut optimizer = Adam::new(0.001);
        let mut weights = Array2::ones((1, 1));
        let gradients = Array2::from_elem((1, 1), 250.0);

        optimizer.begin_step();
        optimizer.update_matrix(0, &mut weights, &gradients);

        assert_relative_eq!(weights[[0, 0]], 1.0 - 0.001, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_decreases_weights() {
        let mut optimizer = Adam::new(0.001);
        let mut weights = Array2::ones((3, 2));
        let gradients = Array2::ones((3, 2));

        for _ in 0..10 {
            optimizer.begin_step();
            optimizer.update_matrix(0, &mut weights, &gradients);
        }

        assert!(weights[[0, 0]] < 1.0);
    }

    #[test]
    fn test_adam_slots_are_independent() {
        let mut optimizer = Adam::new(0.001);
        let mut a = Array2::ones((2, 2));
        let mut b = Array2::ones((2, 2));
        let gradients = Array2::ones((2, 2));

        optimizer.begin_step();
        optimizer.update_matrix(0, &mut a, &gradients);
        optimizer.update_matrix(1, &mut b, &gradients);

        // Fresh moment buffers for each slot give identical first steps
        assert_relative_eq!(a[[0, 0]], b[[0, 0]], epsilon = 1e-12);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut optimizer = Adam::new(0.001);
        let mut weights = Array2::ones((1, 1));
        let gradients = Array2::ones((1, 1));

        optimizer.begin_step();
        optimizer.update_matrix(0, &mut weights, &gradients);
        optimizer.reset();

        let mut fresh = Array2::ones((1, 1));
        optimizer.begin_step();
        optimizer.update_matrix(0, &mut fresh, &gradients);
        assert_relative_eq!(weights[[0, 0]], fresh[[0, 0]], epsilon = 1e-12);
    }
}
