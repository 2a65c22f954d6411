//! Convolution kernels and the shared convolution primitive.

use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use super::color::ensure_not_empty;
use crate::error::Result;
use crate::image::PixelBuffer;

const SHARPEN: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
const EDGE_DETECT: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];
const EMBOSS: [f32; 9] = [-2.0, -1.0, 0.0, -1.0, 0.0, 1.0, 0.0, 1.0, 2.0];
const EMBOSS_BIAS: f32 = 128.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("kernel size must be odd and non-zero, got {0}")]
    EvenSize(usize),

    #[error("a {size}x{size} kernel needs {} weights, got {actual}", .size * .size)]
    WeightCount { size: usize, actual: usize },

    #[error("kernel divisor must be finite and non-zero, got {0}")]
    Divisor(f32),
}

/// Square convolution matrix with normalization divisor and bias.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Box<[f32]>,
    divisor: f32,
    bias: f32,
}

impl Kernel {
    pub fn new(size: usize, weights: Vec<f32>, divisor: f32, bias: f32) -> Result<Self, KernelError> {
        if size % 2 == 0 {
            return Err(KernelError::EvenSize(size));
        }
        if weights.len() != size * size {
            return Err(KernelError::WeightCount {
                size,
                actual: weights.len(),
            });
        }
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(KernelError::Divisor(divisor));
        }
        Ok(Kernel {
            size,
            weights: weights.into_boxed_slice(),
            divisor,
            bias,
        })
    }

    fn from_3x3(weights: [f32; 9], bias: f32) -> Self {
        Kernel {
            size: 3,
            weights: Box::new(weights),
            divisor: 1.0,
            bias,
        }
    }

    /// Laplacian sharpen: center 5, direct neighbours -1.
    pub fn sharpen() -> Self {
        Self::from_3x3(SHARPEN, 0.0)
    }

    /// High-pass: center 8, all neighbours -1.
    pub fn edge_detect() -> Self {
        Self::from_3x3(EDGE_DETECT, 0.0)
    }

    /// Diagonal emboss re-centered on mid-gray.
    pub fn emboss() -> Self {
        Self::from_3x3(EMBOSS, EMBOSS_BIAS)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn divisor(&self) -> f32 {
        self.divisor
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }
}

/// Convolve R, G and B with `kernel`; alpha is copied through.
///
/// Samples outside the image are clamped to the nearest edge pixel, so flat
/// regions stay flat right up to the border.
pub fn convolve(buf: &PixelBuffer, kernel: &Kernel) -> Result<PixelBuffer> {
    ensure_not_empty(buf)?;

    let (width, height) = (buf.width() as usize, buf.height() as usize);
    let src = buf.as_bytes();
    let radius = (kernel.size / 2) as isize;
    let stride = width * 4;

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let mut acc = [0.0f32; 3];
                for ky in 0..kernel.size {
                    let sy = clamp_coord(y as isize + ky as isize - radius, height);
                    let src_row = &src[sy * stride..(sy + 1) * stride];
                    for kx in 0..kernel.size {
                        let w = kernel.weights[ky * kernel.size + kx];
                        if w == 0.0 {
                            continue;
                        }
                        let sx = clamp_coord(x as isize + kx as isize - radius, width);
                        let px = &src_row[sx * 4..sx * 4 + 3];
                        acc[0] += w * px[0] as f32;
                        acc[1] += w * px[1] as f32;
                        acc[2] += w * px[2] as f32;
                    }
                }

                let dst = &mut row[x * 4..x * 4 + 4];
                for (c, sum) in acc.into_iter().enumerate() {
                    let value = sum / kernel.divisor + kernel.bias;
                    dst[c] = value.round().clamp(0.0, 255.0) as u8;
                }
                dst[3] = src[y * stride + x * 4 + 3];
            }
        });

    let out = PixelBuffer::from_raw(buf.width(), buf.height(), out)
        .expect("output has the same shape as the input");
    Ok(out)
}

#[inline]
fn clamp_coord(v: isize, len: usize) -> usize {
    v.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EditorError;
    use proptest::prelude::*;

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(
            Kernel::new(2, vec![1.0; 4], 1.0, 0.0),
            Err(KernelError::EvenSize(2))
        );
        assert_eq!(
            Kernel::new(3, vec![1.0; 8], 1.0, 0.0),
            Err(KernelError::WeightCount { size: 3, actual: 8 })
        );
        assert_eq!(
            Kernel::new(3, vec![1.0; 9], 0.0, 0.0),
            Err(KernelError::Divisor(0.0))
        );
    }

    #[test]
    fn identity_kernel_is_a_no_op() {
        let mut buf = PixelBuffer::new(3, 2);
        buf.put_pixel(1, 1, [10, 20, 30, 40]);
        buf.put_pixel(2, 0, [250, 5, 128, 255]);
        let identity = Kernel::new(1, vec![1.0], 1.0, 0.0).unwrap();
        assert_eq!(convolve(&buf, &identity).unwrap(), buf);
    }

    #[test]
    fn box_blur_uses_divisor() {
        let mut buf = PixelBuffer::from_pixel(3, 3, [0, 0, 0, 255]);
        buf.put_pixel(1, 1, [90, 180, 255, 255]);
        let blur = Kernel::new(3, vec![1.0; 9], 9.0, 0.0).unwrap();
        assert_eq!(convolve(&buf, &blur).unwrap().pixel(1, 1), [10, 20, 28, 255]);
    }

    #[test]
    fn flat_input_stays_flat() {
        let flat = PixelBuffer::from_pixel(6, 5, [100, 150, 200, 255]);
        assert_eq!(convolve(&flat, &Kernel::sharpen()).unwrap(), flat);
        assert_eq!(
            convolve(&flat, &Kernel::edge_detect()).unwrap(),
            PixelBuffer::from_pixel(6, 5, [0, 0, 0, 255])
        );
        assert_eq!(
            convolve(&flat, &Kernel::emboss()).unwrap(),
            PixelBuffer::from_pixel(6, 5, [128, 128, 128, 255])
        );
    }

    #[test]
    fn edge_detect_finds_a_step() {
        let mut buf = PixelBuffer::from_pixel(4, 1, [0, 0, 0, 255]);
        buf.put_pixel(2, 0, [255, 255, 255, 255]);
        buf.put_pixel(3, 0, [255, 255, 255, 255]);
        let out = convolve(&buf, &Kernel::edge_detect()).unwrap();
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 255]);
        // dark side of the step sums to -765
        assert_eq!(out.pixel(1, 0), [0, 0, 0, 255]);
        assert_eq!(out.pixel(2, 0), [255, 255, 255, 255]);
        assert_eq!(out.pixel(3, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn sums_saturate_at_both_ends() {
        let buf = PixelBuffer::from_pixel(3, 3, [1, 100, 200, 255]);
        let mut weights = vec![0.0; 9];
        weights[4] = 1000.0;
        let out = convolve(&buf, &Kernel::new(3, weights.clone(), 1.0, 0.0).unwrap()).unwrap();
        assert_eq!(out.pixel(1, 1), [255, 255, 255, 255]);

        weights[4] = -1000.0;
        let out = convolve(&buf, &Kernel::new(3, weights, 1.0, 0.0).unwrap()).unwrap();
        assert_eq!(out.pixel(1, 1), [0, 0, 0, 255]);

        let biased = Kernel::new(1, vec![1.0], 1.0, -50.0).unwrap();
        assert_eq!(convolve(&buf, &biased).unwrap().pixel(0, 0), [0, 50, 150, 255]);
    }

    /// Straightforward per-pixel evaluation with edge-clamped reads.
    fn reference(buf: &PixelBuffer, kernel: &Kernel) -> PixelBuffer {
        let (w, h) = buf.dimensions();
        let r = (kernel.size() / 2) as i64;
        let mut out = PixelBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let mut px = buf.pixel(x, y);
                for c in 0..3 {
                    let mut sum = 0.0f64;
                    for ky in 0..kernel.size() {
                        for kx in 0..kernel.size() {
                            let sx = (x as i64 + kx as i64 - r).clamp(0, w as i64 - 1) as u32;
                            let sy = (y as i64 + ky as i64 - r).clamp(0, h as i64 - 1) as u32;
                            let weight = kernel.weights()[ky * kernel.size() + kx] as f64;
                            sum += weight * buf.pixel(sx, sy)[c] as f64;
                        }
                    }
                    let value = sum / kernel.divisor() as f64 + kernel.bias() as f64;
                    px[c] = value.round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(x, y, px);
            }
        }
        out
    }

    #[test]
    fn alpha_is_passed_through() {
        let mut buf = PixelBuffer::from_pixel(3, 3, [50, 50, 50, 30]);
        buf.put_pixel(0, 0, [50, 50, 50, 200]);
        let out = convolve(&buf, &Kernel::emboss()).unwrap();
        assert_eq!(out.pixel(0, 0)[3], 200);
        assert_eq!(out.pixel(2, 2)[3], 30);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(
            convolve(&PixelBuffer::new(0, 4), &Kernel::sharpen()),
            Err(EditorError::InvalidHandle)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn extreme_kernels_stay_in_range(
            (w, h, px) in (1u32..8, 1u32..8).prop_flat_map(|(w, h)| {
                (Just(w), Just(h), proptest::collection::vec(any::<u8>(), (w * h * 4) as usize))
            }),
            center in -1000i32..1000,
        ) {
            let buf = PixelBuffer::from_raw(w, h, px).unwrap();
            let extreme = Kernel::new(
                3,
                vec![-50.0, 3.0, -50.0, 3.0, center as f32, 3.0, -50.0, 3.0, -50.0],
                1.0,
                0.0,
            )
            .unwrap();
            for k in [extreme, Kernel::sharpen(), Kernel::edge_detect(), Kernel::emboss()] {
                prop_assert_eq!(convolve(&buf, &k).unwrap(), reference(&buf, &k));
            }
        }
    }
}
