use std::fmt;
use std::str::FromStr;

use image::{imageops::FilterType, DynamicImage};
use ndarray::prelude::*;
use ort::session::Session;
use serde_derive::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::device::{self, Device};
use crate::error::Error;

/// Emotion categories in the order of the classifier's output units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Neutral,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
    ];

    #[inline]
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown emotion label '{}'", s))
    }
}

/// Backend scoring a normalized `1 x 3 x S x S` face tensor.
pub trait EmotionModel {
    /// Raw output activations, one per label.
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, Error>;
}

impl<M: EmotionModel + ?Sized> EmotionModel for Box<M> {
    #[inline]
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, Error> {
        (**self).forward(input)
    }
}

/// ResNet-18 with a seven-way head, exported to ONNX.
pub struct OnnxEmotionModel {
    session: Session,
    device: Device,
}

impl OnnxEmotionModel {
    /// Loads the weights named by `config` on its preferred device.
    pub fn load(config: &ClassifierConfig) -> Result<Self, Error> {
        Self::load_on(config, Device::select(config.device))
    }

    /// Loads the weights on an already resolved device.
    ///
    /// Fails when the file is missing or when the graph does not map a
    /// `1 x 3 x S x S` tensor to seven activations.
    pub fn load_on(config: &ClassifierConfig, device: Device) -> Result<Self, Error> {
        config.validate()?;

        let session = device::load_session(&config.weights, device)?;
        let mut model = Self { session, device };

        let size = config.input_size as usize;
        let probe = Array4::<f32>::zeros((1, 3, size, size));
        let incompatible = |reason: String| Error::IncompatibleModel {
            path: config.weights.clone(),
            reason,
        };

        let scores = model
            .forward(probe.view())
            .map_err(|err| incompatible(err.to_string()))?;
        if scores.len() != EmotionLabel::ALL.len() {
            return Err(incompatible(format!(
                "expected {} outputs, got {}",
                EmotionLabel::ALL.len(),
                scores.len()
            )));
        }

        log::debug!(
            "emotion model {} ready on {:?}",
            config.weights.display(),
            device
        );

        Ok(model)
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }
}

impl EmotionModel for OnnxEmotionModel {
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, Error> {
        let mut outputs = device::run_session(&mut self.session, input)?;
        if outputs.is_empty() {
            return Err(Error::InvalidModelOutput("graph produced no outputs".into()));
        }

        Ok(outputs.swap_remove(0))
    }
}

/// Maps face images to emotion labels.
///
/// Holds its model for its whole lifetime; build one at startup and hand it to
/// whoever needs predictions.
pub struct EmotionClassifier<M> {
    model: M,
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl EmotionClassifier<OnnxEmotionModel> {
    pub fn load(config: &ClassifierConfig) -> Result<Self, Error> {
        let model = OnnxEmotionModel::load(config)?;

        Self::new(model, config)
    }
}

impl<M: EmotionModel> EmotionClassifier<M> {
    pub fn new(model: M, config: &ClassifierConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            model,
            input_size: config.input_size,
            mean: config.mean,
            std: config.std,
        })
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Resized, scaled and normalized `1 x 3 x S x S` input for `image`.
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.input_size;
        let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();

        Array4::from_shape_fn((1, 3, size as usize, size as usize), |(_, c, y, x)| {
            let v = rgb.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0;
            (v - self.mean[c]) / self.std[c]
        })
    }

    /// Raw activations for `image`, one per label.
    pub fn predict_scores(&mut self, image: &DynamicImage) -> Result<Vec<f32>, Error> {
        let input = self.preprocess(image);
        let scores = self.model.forward(input.view())?;

        if scores.len() != EmotionLabel::ALL.len() {
            return Err(Error::InvalidModelOutput(format!(
                "expected {} scores, got {}",
                EmotionLabel::ALL.len(),
                scores.len()
            )));
        }

        Ok(scores)
    }

    pub fn predict(&mut self, image: &DynamicImage) -> Result<EmotionLabel, Error> {
        let scores = self.predict_scores(image)?;

        argmax(&scores)
            .and_then(EmotionLabel::from_index)
            .ok_or_else(|| Error::InvalidModelOutput("all scores are NaN".into()))
    }
}

/// Index of the largest non-NaN value; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (idx, &val) in values.iter().enumerate() {
        if val.is_nan() {
            continue;
        }

        match best {
            Some((_, b)) if val <= b => (),
            _ => best = Some((idx, val)),
        }
    }

    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// One-hot on the unit selected by the mean of the first channel.
    struct Probe {
        calls: usize,
        last_shape: Vec<usize>,
        outputs: usize,
    }

    impl Probe {
        fn new(outputs: usize) -> Self {
            Self {
                calls: 0,
                last_shape: vec![],
                outputs,
            }
        }
    }

    impl EmotionModel for Probe {
        fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, Error> {
            self.calls += 1;
            self.last_shape = input.shape().to_vec();

            let mean = input.slice(s![0, 0, .., ..]).mean().unwrap_or(0.0);
            let hot = ((mean + 1.0) / 2.0 * 6.0).round() as usize;

            Ok((0..self.outputs)
                .map(|i| if i == hot { 1.0 } else { 0.0 })
                .collect())
        }
    }

    fn gray(value: u8, w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([value, value, value])))
    }

    #[test]
    fn label_table_order() {
        let names: Vec<_> = EmotionLabel::ALL.iter().map(|l| l.as_str()).collect();
        assert_eq!(
            names,
            ["angry", "disgust", "fear", "happy", "neutral", "sad", "surprise"]
        );

        for (idx, label) in EmotionLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), idx);
            assert_eq!(EmotionLabel::from_index(idx), Some(*label));
            assert_eq!(label.to_string().parse::<EmotionLabel>(), Ok(*label));
        }

        assert_eq!(EmotionLabel::from_index(7), None);
        assert!("bored".parse::<EmotionLabel>().is_err());
    }

    #[test]
    fn argmax_picks_first_maximum_and_skips_nan() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, -3.0, -4.0]), Some(1));
        assert_eq!(argmax(&[f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn preprocess_resizes_and_normalizes() {
        let classifier =
            EmotionClassifier::new(Probe::new(7), &ClassifierConfig::default()).unwrap();

        let input = classifier.preprocess(&gray(255, 100, 60));
        assert_eq!(input.shape(), &[1, 3, 48, 48]);
        assert!(input.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let input = classifier.preprocess(&gray(0, 10, 10));
        assert!(input.iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn grayscale_input_is_expanded_to_three_channels() {
        let classifier =
            EmotionClassifier::new(Probe::new(7), &ClassifierConfig::default()).unwrap();
        let luma = image::GrayImage::from_pixel(48, 48, image::Luma([51]));
        let luma = DynamicImage::ImageLuma8(luma);

        let input = classifier.preprocess(&luma);
        assert_eq!(input.shape(), &[1, 3, 48, 48]);
        assert!((input[[0, 2, 5, 5]] - (0.2 - 0.5) / 0.5).abs() < 1e-5);
    }

    #[test]
    fn predict_maps_argmax_to_label() {
        let mut classifier =
            EmotionClassifier::new(Probe::new(7), &ClassifierConfig::default()).unwrap();

        let label = classifier.predict(&gray(0, 20, 20)).unwrap();
        assert_eq!(label, EmotionLabel::Angry);

        let label = classifier.predict(&gray(255, 20, 20)).unwrap();
        assert_eq!(label, EmotionLabel::Surprise);
        assert_eq!(classifier.model().last_shape, vec![1, 3, 48, 48]);
    }

    #[test]
    fn predict_is_deterministic() {
        let mut classifier =
            EmotionClassifier::new(Probe::new(7), &ClassifierConfig::default()).unwrap();
        let image = gray(140, 64, 64);

        let first = classifier.predict(&image).unwrap();
        let second = classifier.predict(&image).unwrap();

        assert_eq!(first, second);
        assert_eq!(classifier.model().calls, 2);
    }

    #[test]
    fn wrong_output_size_is_an_error() {
        let mut classifier =
            EmotionClassifier::new(Probe::new(10), &ClassifierConfig::default()).unwrap();

        assert!(matches!(
            classifier.predict(&gray(0, 8, 8)),
            Err(Error::InvalidModelOutput(_))
        ));
    }

    #[test]
    fn boxed_models_are_models() {
        let model: Box<dyn EmotionModel> = Box::new(Probe::new(7));
        let mut classifier = EmotionClassifier::new(model, &ClassifierConfig::default()).unwrap();

        assert_eq!(classifier.predict(&gray(0, 8, 8)).unwrap(), EmotionLabel::Angry);
    }

    #[test]
    fn missing_weights_fail_at_load() {
        let config = ClassifierConfig::with_weights("no/such/weights.onnx");

        assert!(matches!(
            OnnxEmotionModel::load_on(&config, Device::Cpu),
            Err(Error::ModelNotFound(_))
        ));
    }
}
