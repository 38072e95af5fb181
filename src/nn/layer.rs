//! Network layers
//!
//! A hidden block is Linear -> BatchNorm -> ReLU -> Dropout; the output
//! layer is a plain Linear projection whose logits the model squashes with
//! a sigmoid. Every layer caches what its backward pass needs during
//! forward, and the caches are never serialized.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::activation::{relu, relu_mask};

/// Fully connected layer: output = input * weights + bias.
#[derive(Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix (input_size x output_size)
    pub weights: Array2<f64>,
    /// Bias vector (output_size)
    pub biases: Array1<f64>,
    /// Input size
    pub input_size: usize,
    /// Output size
    pub output_size: usize,

    // Cached for backpropagation, not serialized
    #[serde(skip)]
    pub last_input: Option<Array2<f64>>,
}

impl Linear {
    /// Create a new layer with Xavier initialization.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        // Xavier/Glorot uniform
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weights = Array2::random((input_size, output_size), Uniform::new(-limit, limit));
        let biases = Array1::zeros(output_size);

        Self {
            weights,
            biases,
            input_size,
            output_size,
            last_input: None,
        }
    }

    /// Linear transformation: z = input @ weights + bias.
    pub fn forward(&mut self, input: &Array2<f64>) -> Array2<f64> {
        self.last_input = Some(input.clone());

        let mut z = input.dot(&self.weights);
        for mut row in z.rows_mut() {
            row += &self.biases;
        }
        z
    }

    /// Backward pass given the gradient with respect to z.
    /// Returns: (input_gradient, weight_gradient, bias_gradient)
    pub fn backward(&self, delta: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let input = self
            .last_input
            .as_ref()
            .expect("forward must run before backward");

        let weight_gradient = input.t().dot(delta);
        let bias_gradient = delta.sum_axis(Axis(0));
        let input_gradient = delta.dot(&self.weights.t());

        (input_gradient, weight_gradient, bias_gradient)
    }

    /// Get number of parameters.
    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

impl Clone for Linear {
    fn clone(&self) -> Self {
        Self {
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            input_size: self.input_size,
            output_size: self.output_size,
            last_input: None,
        }
    }
}

/// Batch normalization over the feature axis.
///
/// Training passes normalize with statistics of the current batch and fold
/// them into running estimates; evaluation passes normalize with the
/// running estimates only, so inference is deterministic.
#[derive(Serialize, Deserialize)]
pub struct BatchNorm1d {
    /// Learned scale (gamma)
    pub weight: Array1<f64>,
    /// Learned shift (beta)
    pub bias: Array1<f64>,
    /// Running mean, updated during training
    pub running_mean: Array1<f64>,
    /// Running variance, updated during training
    pub running_var: Array1<f64>,
    /// Numerical stability floor inside the square root
    pub eps: f64,
    /// Weight of the current batch in the running estimates
    pub momentum: f64,
    /// Feature count
    pub num_features: usize,

    // Cached for backpropagation, not serialized
    #[serde(skip)]
    last_normalized: Option<Array2<f64>>,
    #[serde(skip)]
    last_std: Option<Array1<f64>>,
}

impl BatchNorm1d {
    pub fn new(num_features: usize) -> Self {
        Self {
            weight: Array1::ones(num_features),
            bias: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            eps: 1e-5,
            momentum: 0.1,
            num_features,
            last_normalized: None,
            last_std: None,
        }
    }

    /// Forward pass: y = gamma * x_hat + beta.
    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        let normalized = if training {
            let n = input.nrows() as f64;
            let mean = input.sum_axis(Axis(0)) / n;
            let centered = input - &mean;
            let var = centered.mapv(|d| d * d).sum_axis(Axis(0)) / n;

            // Running estimates use the unbiased variance
            let unbiased = if input.nrows() > 1 {
                &var * (n / (n - 1.0))
            } else {
                var.clone()
            };
            self.running_mean =
                &self.running_mean * (1.0 - self.momentum) + &mean * self.momentum;
            self.running_var =
                &self.running_var * (1.0 - self.momentum) + &unbiased * self.momentum;

            let std = var.mapv(|v| (v + self.eps).sqrt());
            let normalized = &centered / &std;
            self.last_normalized = Some(normalized.clone());
            self.last_std = Some(std);
            normalized
        } else {
            let std = self.running_var.mapv(|v| (v + self.eps).sqrt());
            (input - &self.running_mean) / &std
        };

        &normalized * &self.weight + &self.bias
    }

    /// Backward pass through the training-mode normalization.
    /// Returns: (input_gradient, gamma_gradient, beta_gradient)
    pub fn backward(&self, output_gradient: &Array2<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let normalized = self
            .last_normalized
            .as_ref()
            .expect("forward must run before backward");
        let std = self
            .last_std
            .as_ref()
            .expect("forward must run before backward");

        let n = output_gradient.nrows() as f64;
        let beta_gradient = output_gradient.sum_axis(Axis(0));
        let gamma_gradient = (output_gradient * normalized).sum_axis(Axis(0));

        let dxhat = output_gradient * &self.weight;
        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * normalized).sum_axis(Axis(0));

        let scale = std.mapv(|s| 1.0 / (n * s));
        let input_gradient =
            (&dxhat * n - &sum_dxhat - &(normalized * &sum_dxhat_xhat)) * &scale;

        (input_gradient, gamma_gradient, beta_gradient)
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

impl Clone for BatchNorm1d {
    fn clone(&self) -> Self {
        Self {
            weight: self.weight.clone(),
            bias: self.bias.clone(),
            running_mean: self.running_mean.clone(),
            running_var: self.running_var.clone(),
            eps: self.eps,
            momentum: self.momentum,
            num_features: self.num_features,
            last_normalized: None,
            last_std: None,
        }
    }
}

/// One hidden stage of the classifier: Linear -> BatchNorm -> ReLU -> Dropout.
#[derive(Serialize, Deserialize)]
pub struct HiddenBlock {
    pub linear: Linear,
    pub norm: BatchNorm1d,
    /// Fraction of activations dropped during training (0.0 = no dropout)
    pub dropout_rate: f64,

    // Cached for backpropagation, not serialized
    #[serde(skip)]
    relu_gate: Option<Array2<f64>>,
    #[serde(skip)]
    dropout_mask: Option<Array2<f64>>,
}

/// Parameter gradients of one hidden block.
pub struct HiddenBlockGrads {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
    pub gamma: Array1<f64>,
    pub beta: Array1<f64>,
}

impl HiddenBlock {
    pub fn new(input_size: usize, output_size: usize, dropout_rate: f64) -> Self {
        Self {
            linear: Linear::new(input_size, output_size),
            norm: BatchNorm1d::new(output_size),
            dropout_rate: dropout_rate.clamp(0.0, 1.0),
            relu_gate: None,
            dropout_mask: None,
        }
    }

    /// Forward pass through the block.
    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        let z = self.linear.forward(input);
        let h = self.norm.forward(&z, training);
        self.relu_gate = Some(relu_mask(&h));
        let mut output = relu(&h);

        if training && self.dropout_rate > 0.0 {
            let mut rng = rand::thread_rng();
            let mask = Array2::from_shape_fn(output.dim(), |_| {
                if rng.gen::<f64>() > self.dropout_rate {
                    1.0 / (1.0 - self.dropout_rate) // Scale to maintain expected value
                } else {
                    0.0
                }
            });
            output = &output * &mask;
            self.dropout_mask = Some(mask);
        } else {
            self.dropout_mask = None;
        }

        output
    }

    /// Backward pass - compute gradients.
    /// Returns the gradient for the previous stage and this block's
    /// parameter gradients.
    pub fn backward(&self, output_gradient: &Array2<f64>) -> (Array2<f64>, HiddenBlockGrads) {
        let gate = self
            .relu_gate
            .as_ref()
            .expect("forward must run before backward");

        // Undo dropout scaling, then gate through the ReLU
        let grad = if let Some(mask) = &self.dropout_mask {
            output_gradient * mask
        } else {
            output_gradient.clone()
        };
        let grad = &grad * gate;

        let (norm_grad, gamma, beta) = self.norm.backward(&grad);
        let (input_gradient, weights, biases) = self.linear.backward(&norm_grad);

        (
            input_gradient,
            HiddenBlockGrads {
                weights,
                biases,
                gamma,
                beta,
            },
        )
    }

    pub fn output_size(&self) -> usize {
        self.linear.output_size
    }

    pub fn num_parameters(&self) -> usize {
        self.linear.num_parameters() + self.norm.num_parameters()
    }
}

impl Clone for HiddenBlock {
    fn clone(&self) -> Self {
        Self {
            linear: self.linear.clone(),
            norm: self.norm.clone(),
            dropout_rate: self.dropout_rate,
            relu_gate: None,
            dropout_mask: None,
        }
    }
}
