//! Image classification with externally supplied models

mod labels;
mod layers;
mod model;

pub use labels::Labels;
pub use model::{InputSpec, LayerSpec, Model, ModelBuilder, MAX_INPUT_SIDE, MAX_TENSOR_LEN};

use fast_image_resize as fr;
use fr::images::Image as FrImage;
use imageproc::image::DynamicImage;

use crate::error::InferenceError;
use crate::image::PixelBuffer;
use layers::{ConvParams, PoolKind, Shape, Tensor};

/// Best class of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Classification {
    /// Probability of the winning class, in [0, 1].
    pub confidence: f32,
    /// 1-based index into the model's label list.
    pub class_index: u32,
}

impl Classification {
    pub fn label<'a>(&self, labels: &'a Labels) -> Result<&'a str, InferenceError> {
        labels.resolve(self.class_index)
    }
}

/// Classify `buf` with `model`.
pub fn classify(buf: &PixelBuffer, model: &Model) -> Result<Classification, InferenceError> {
    let input = preprocess(buf, model.input())?;
    let probabilities = forward(model, input);

    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(InferenceError::MalformedModel(
            "forward pass produced non-finite values".to_string(),
        ));
    }

    // first maximum wins ties
    let (best, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

    let result = Classification {
        confidence,
        class_index: best as u32 + 1,
    };
    log::debug!(
        "Classified {}x{} image: class {} ({:.3})",
        buf.width(),
        buf.height(),
        result.class_index,
        result.confidence
    );
    Ok(result)
}

/// Resize to the model input and normalize into a CHW tensor.
fn preprocess(buf: &PixelBuffer, spec: &InputSpec) -> Result<Tensor, InferenceError> {
    let shape_mismatch = |actual: String| InferenceError::ShapeMismatch {
        expected: format!("an image resizable to {}x{}", spec.width, spec.height),
        actual,
    };

    if buf.is_empty() {
        return Err(shape_mismatch(format!("{}x{}", buf.width(), buf.height())));
    }

    let rgb = DynamicImage::ImageRgba8(buf.as_image().clone()).into_rgb8();
    let src = FrImage::from_vec_u8(buf.width(), buf.height(), rgb.into_raw(), fr::PixelType::U8x3)
        .map_err(|e| shape_mismatch(e.to_string()))?;
    let mut dst = FrImage::new(spec.width, spec.height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            Some(
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            ),
        )
        .map_err(|e| shape_mismatch(e.to_string()))?;

    let shape = Shape::new(3, spec.height as usize, spec.width as usize);
    let plane = shape.plane();
    let mut data = vec![0.0f32; shape.len()];
    for (i, px) in dst.buffer().chunks_exact(3).enumerate() {
        for c in 0..3 {
            data[c * plane + i] = (px[c] as f32 / 255.0 - spec.mean[c]) / spec.std[c];
        }
    }

    Ok(Tensor::new(shape, data))
}

/// Run every layer, ending in a probability vector.
fn forward(model: &Model, input: Tensor) -> Vec<f32> {
    let mut x = input;
    for layer in model.layers() {
        debug_assert_eq!(x.shape, layer.input);
        x = match layer.spec {
            LayerSpec::Conv2d {
                out_channels,
                kernel,
                stride,
                padding,
                groups,
            } => {
                let params = ConvParams {
                    out_channels,
                    kernel,
                    stride,
                    padding,
                    groups,
                };
                layers::conv2d(&x, &params, layer.output, &layer.weights, &layer.bias)
            }
            LayerSpec::Relu => layers::relu(x, None),
            LayerSpec::Relu6 => layers::relu(x, Some(6.0)),
            LayerSpec::MaxPool { kernel, stride } => {
                layers::pool2d(&x, PoolKind::Max, kernel, stride, layer.output)
            }
            LayerSpec::AvgPool { kernel, stride } => {
                layers::pool2d(&x, PoolKind::Average, kernel, stride, layer.output)
            }
            LayerSpec::GlobalAvgPool => layers::global_avg_pool(&x),
            LayerSpec::Flatten => Tensor::new(layer.output, x.data),
            LayerSpec::Dense { out_features } => {
                layers::dense(&x, out_features, &layer.weights, &layer.bias)
            }
            LayerSpec::Softmax => layers::softmax(x),
        };
    }

    let ends_in_softmax = matches!(model.layers().last().map(|l| l.spec), Some(LayerSpec::Softmax));
    if ends_in_softmax {
        x.data
    } else {
        layers::softmax(x).data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Averages each channel and scores it, so the dominant color wins.
    fn color_model(with_softmax: bool) -> Model {
        let mut builder = ModelBuilder::new(InputSpec {
            width: 8,
            height: 8,
            ..Default::default()
        })
        .layer(LayerSpec::GlobalAvgPool, &[])
        .layer(
            LayerSpec::Dense { out_features: 3 },
            &[10.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0],
        );
        if with_softmax {
            builder = builder.layer(LayerSpec::Softmax, &[]);
        }
        Model::from_bytes(&builder.labels(["red", "green", "blue"]).build()).unwrap()
    }

    #[test]
    fn picks_dominant_channel() {
        let model = color_model(true);
        let red = PixelBuffer::from_pixel(32, 20, [255, 0, 0, 255]);
        let result = classify(&red, &model).unwrap();
        assert_eq!(result.class_index, 1);
        let expected = 10f32.exp() / (10f32.exp() + 2.0);
        assert!((result.confidence - expected).abs() < 1e-4);
        assert_eq!(result.label(model.labels().unwrap()).unwrap(), "red");

        let blue = PixelBuffer::from_pixel(3, 5, [0, 0, 255, 255]);
        assert_eq!(classify(&blue, &model).unwrap().class_index, 3);
    }

    #[test]
    fn softmax_is_added_when_missing() {
        let with = classify(&PixelBuffer::from_pixel(4, 4, [0, 200, 0, 255]), &color_model(true)).unwrap();
        let without =
            classify(&PixelBuffer::from_pixel(4, 4, [0, 200, 0, 255]), &color_model(false)).unwrap();
        assert_eq!(with.class_index, 2);
        assert_eq!(with, without);
    }

    #[test]
    fn ties_pick_the_lowest_index() {
        let gray = PixelBuffer::from_pixel(4, 4, [90, 90, 90, 255]);
        let result = classify(&gray, &color_model(true)).unwrap();
        assert_eq!(result.class_index, 1);
        assert!((result.confidence - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn zero_width_is_a_shape_mismatch() {
        let model = color_model(true);
        assert!(matches!(
            classify(&PixelBuffer::new(0, 10), &model),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn normalization_uses_mean_and_std() {
        let spec = InputSpec {
            width: 2,
            height: 2,
            mean: [0.5, 0.0, 1.0],
            std: [0.5, 1.0, 2.0],
        };
        let tensor = preprocess(&PixelBuffer::from_pixel(2, 2, [255, 0, 255, 255]), &spec).unwrap();
        assert_eq!(tensor.shape, Shape::new(3, 2, 2));
        assert_eq!(&tensor.data[..4], &[1.0; 4]);
        assert_eq!(&tensor.data[4..8], &[0.0; 4]);
        assert_eq!(&tensor.data[8..], &[0.0; 4]);
    }

    #[test]
    fn conv_network_runs_end_to_end() {
        let mut box_blur = vec![1.0f32 / 9.0; 27];
        box_blur.extend([0.0; 3]);

        let blob = ModelBuilder::new(InputSpec {
            width: 6,
            height: 6,
            ..Default::default()
        })
        .layer(
            LayerSpec::Conv2d {
                out_channels: 3,
                kernel: 3,
                stride: 1,
                padding: 1,
                groups: 3,
            },
            &box_blur,
        )
        .layer(LayerSpec::Relu6, &[])
        .layer(LayerSpec::AvgPool { kernel: 2, stride: 2 }, &[])
        .layer(LayerSpec::MaxPool { kernel: 3, stride: 1 }, &[])
        .layer(LayerSpec::Flatten, &[])
        .layer(LayerSpec::Dense { out_features: 2 }, &[5.0, -5.0, 0.0, -5.0, 5.0, 0.0, 0.0, 0.0])
        .build();
        let model = Model::from_bytes(&blob).unwrap();

        let result = classify(&PixelBuffer::from_pixel(12, 12, [0, 255, 0, 255]), &model).unwrap();
        assert_eq!(result.class_index, 2);
        assert!(result.confidence > 0.99);
    }
}
