//! Forward kernels for the layer types a model header can declare.
//!
//! Tensors are a single image in CHW layout. Flat vectors are `(n, 1, 1)`.

use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Shape {
            channels,
            height,
            width,
        }
    }

    pub const fn flat(len: usize) -> Self {
        Shape::new(len, 1, 1)
    }

    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Element count, or `None` if it does not fit in `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.channels.checked_mul(self.height)?.checked_mul(self.width)
    }

    pub fn plane(&self) -> usize {
        self.height * self.width
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Shape,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Shape, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.len(), data.len());
        Tensor { shape, data }
    }

    #[inline]
    fn at(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[(c * self.shape.height + y) * self.shape.width + x]
    }
}

/// Hyper-parameters of a 2D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
    pub groups: usize,
}

impl ConvParams {
    /// Output shape for `input`, or `None` when the kernel does not fit.
    pub fn output_shape(&self, input: Shape) -> Option<Shape> {
        if self.kernel == 0 || self.stride == 0 || self.groups == 0 {
            return None;
        }
        if input.channels % self.groups != 0 || self.out_channels % self.groups != 0 {
            return None;
        }
        let pad = self.padding.checked_mul(2)?;
        let out_h = window_count(input.height.checked_add(pad)?, self.kernel, self.stride)?;
        let out_w = window_count(input.width.checked_add(pad)?, self.kernel, self.stride)?;
        Some(Shape::new(self.out_channels, out_h, out_w))
    }

    /// Weight count (without bias) for `in_channels` inputs.
    pub fn weight_count(&self, in_channels: usize) -> Option<usize> {
        self.out_channels
            .checked_mul(in_channels / self.groups)?
            .checked_mul(self.kernel)?
            .checked_mul(self.kernel)
    }
}

/// Number of `kernel`-wide windows with `stride` that fit in `len`.
pub fn window_count(len: usize, kernel: usize, stride: usize) -> Option<usize> {
    if kernel == 0 || stride == 0 || len < kernel {
        return None;
    }
    Some((len - kernel) / stride + 1)
}

/// Zero-padded grouped convolution. Weights are `[out, in/groups, k, k]`.
pub fn conv2d(input: &Tensor, params: &ConvParams, out_shape: Shape, weights: &[f32], bias: &[f32]) -> Tensor {
    let in_per_group = input.shape.channels / params.groups;
    let out_per_group = params.out_channels / params.groups;
    let k = params.kernel;
    let pad = params.padding as isize;

    let mut out = vec![0.0f32; out_shape.len()];
    out.par_chunks_mut(out_shape.plane())
        .enumerate()
        .for_each(|(oc, plane)| {
            let first_ic = (oc / out_per_group) * in_per_group;
            let oc_weights = &weights[oc * in_per_group * k * k..(oc + 1) * in_per_group * k * k];

            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let mut acc = bias[oc];
                    for icl in 0..in_per_group {
                        let ic = first_ic + icl;
                        for ky in 0..k {
                            let iy = (oy * params.stride + ky) as isize - pad;
                            if iy < 0 || iy >= input.shape.height as isize {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = (ox * params.stride + kx) as isize - pad;
                                if ix < 0 || ix >= input.shape.width as isize {
                                    continue;
                                }
                                acc += oc_weights[(icl * k + ky) * k + kx]
                                    * input.at(ic, iy as usize, ix as usize);
                            }
                        }
                    }
                    plane[oy * out_shape.width + ox] = acc;
                }
            }
        });

    Tensor::new(out_shape, out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Average,
}

pub fn pool2d(input: &Tensor, kind: PoolKind, kernel: usize, stride: usize, out_shape: Shape) -> Tensor {
    let mut out = vec![0.0f32; out_shape.len()];
    out.par_chunks_mut(out_shape.plane())
        .enumerate()
        .for_each(|(c, plane)| {
            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let window = (0..kernel).flat_map(|ky| {
                        (0..kernel).map(move |kx| (oy * stride + ky, ox * stride + kx))
                    });
                    plane[oy * out_shape.width + ox] = match kind {
                        PoolKind::Max => window
                            .map(|(y, x)| input.at(c, y, x))
                            .fold(f32::NEG_INFINITY, f32::max),
                        PoolKind::Average => {
                            window.map(|(y, x)| input.at(c, y, x)).sum::<f32>()
                                / (kernel * kernel) as f32
                        }
                    };
                }
            }
        });

    Tensor::new(out_shape, out)
}

pub fn global_avg_pool(input: &Tensor) -> Tensor {
    let plane = input.shape.plane();
    let data = input
        .data
        .chunks_exact(plane)
        .map(|ch| ch.iter().sum::<f32>() / plane as f32)
        .collect();
    Tensor::new(Shape::flat(input.shape.channels), data)
}

/// Fully connected layer over the flattened input. Weights are `[out, in]`.
pub fn dense(input: &Tensor, out_features: usize, weights: &[f32], bias: &[f32]) -> Tensor {
    let in_features = input.data.len();
    let data = (0..out_features)
        .into_par_iter()
        .map(|o| {
            let row = &weights[o * in_features..(o + 1) * in_features];
            bias[o] + row.iter().zip(&input.data).map(|(w, x)| w * x).sum::<f32>()
        })
        .collect();
    Tensor::new(Shape::flat(out_features), data)
}

pub fn relu(mut input: Tensor, cap: Option<f32>) -> Tensor {
    let cap = cap.unwrap_or(f32::INFINITY);
    input.data.iter_mut().for_each(|v| *v = v.max(0.0).min(cap));
    input
}

pub fn softmax(mut input: Tensor) -> Tensor {
    let max = input.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in input.data.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    input.data.iter_mut().for_each(|v| *v /= sum);
    input.shape = Shape::flat(input.data.len());
    input
}
