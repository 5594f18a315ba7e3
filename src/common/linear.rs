// Copyright 2018 The naive-nmt Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Borrow;
use tch::nn::{Init, Module, Path};
use tch::Tensor;

/// Uniform initializer in `[-init_weight, init_weight]` shared by every variable of the model.
pub fn uniform_init(init_weight: f64) -> Init {
    Init::Uniform {
        lo: -init_weight,
        up: init_weight,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DenseConfig {
    pub kernel_init: Init,
    /// Initializer of the bias, no bias when `None`
    pub bias_init: Option<Init>,
}

impl DenseConfig {
    pub fn new(init_weight: f64) -> DenseConfig {
        DenseConfig {
            kernel_init: uniform_init(init_weight),
            bias_init: Some(Init::Const(0.)),
        }
    }

    pub fn no_bias(init_weight: f64) -> DenseConfig {
        DenseConfig {
            kernel_init: uniform_init(init_weight),
            bias_init: None,
        }
    }
}

impl Default for DenseConfig {
    fn default() -> Self {
        DenseConfig::new(0.1)
    }
}

/// Dense layer storing its kernel as `[in_dim, out_dim]`.
#[derive(Debug)]
pub struct Dense {
    pub kernel: Tensor,
    pub bias: Option<Tensor>,
}

pub fn dense<'a, T: Borrow<Path<'a>>>(vs: T, in_dim: i64, out_dim: i64, c: DenseConfig) -> Dense {
    let vs = vs.borrow();
    let bias = c
        .bias_init
        .map(|bias_init| vs.var("bias", &[out_dim], bias_init));
    Dense {
        kernel: vs.var("kernel", &[in_dim, out_dim], c.kernel_init),
        bias,
    }
}

impl Module for Dense {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let output = xs.matmul(&self.kernel);
        match &self.bias {
            Some(bias) => output + bias,
            None => output,
        }
    }
}
