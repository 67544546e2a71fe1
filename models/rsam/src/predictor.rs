use anyhow::Context;
use candle_core::{IndexOp, Tensor};
use image::DynamicImage;

use crate::mask::Mask;
use crate::preprocess;
use crate::Sam;

/// Settings for a single prediction.
///
/// The default prompt is empty: the model is queried with no point or box
/// prompts and segments the most prominent subject of the image.
#[derive(Debug, Clone, Default)]
pub struct SamPrompt {
    threshold: f32,

    /// List of x,y coordinates, between 0 and 1 (0.5 is at the middle of the image).
    goal_points: Vec<(f64, f64)>,

    /// List of x,y coordinates, between 0 and 1 (0.5 is at the middle of the image).
    avoid_points: Vec<(f64, f64)>,

    multimask: bool,
}

impl SamPrompt {
    /// Creates a new empty prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the detection threshold for the mask, 0 is the default value.
    /// - A negative values makes the model return a larger mask.
    /// - A positive makes the model return a smaller mask.
    pub fn set_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Add a point to the list of points to segment.
    pub fn add_goal_point(mut self, x: impl Into<f64>, y: impl Into<f64>) -> Self {
        self.goal_points.push((x.into(), y.into()));
        self
    }

    /// Set the list of points to segment.
    pub fn set_goal_points(mut self, points: Vec<(f64, f64)>) -> Self {
        self.goal_points = points;
        self
    }

    /// Add a point to the list of points to avoid.
    pub fn add_avoid_point(mut self, x: impl Into<f64>, y: impl Into<f64>) -> Self {
        self.avoid_points.push((x.into(), y.into()));
        self
    }

    /// Set the list of points to avoid.
    pub fn set_avoid_points(mut self, points: Vec<(f64, f64)>) -> Self {
        self.avoid_points = points;
        self
    }

    /// Ask the model for its ranked mask candidates instead of a single mask.
    pub fn multimask(mut self, multimask: bool) -> Self {
        self.multimask = multimask;
        self
    }

    pub(crate) fn points(&self) -> Vec<(f64, f64, bool)> {
        let mut points = Vec::with_capacity(self.goal_points.len() + self.avoid_points.len());
        for (x, y) in &self.goal_points {
            points.push((*x, *y, true));
        }
        for (x, y) in &self.avoid_points {
            points.push((*x, *y, false));
        }
        points
    }
}

/// The masks produced by one [`SamPredictor::predict`] call, ranked by the
/// model's predicted IoU.
#[derive(Debug, Clone)]
pub struct MaskPrediction {
    masks: Vec<Mask>,
}

impl MaskPrediction {
    pub(crate) fn new(mut masks: Vec<Mask>) -> anyhow::Result<Self> {
        anyhow::ensure!(!masks.is_empty(), "the model returned no mask candidates");
        masks.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(Self { masks })
    }

    /// The mask the model is most confident in.
    pub fn best(&self) -> &Mask {
        &self.masks[0]
    }

    /// All candidate masks, best first.
    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    /// Consume the prediction and return the candidate masks, best first.
    pub fn into_masks(self) -> Vec<Mask> {
        self.masks
    }
}

struct EmbeddedImage {
    tensor: Tensor,
    original_width: u32,
    original_height: u32,
}

/// A predictor over one image.
///
/// Mirrors the set-image-then-predict flow of the upstream predictor: the
/// image is preprocessed once by [`SamPredictor::set_image`] and can then be
/// queried any number of times with different prompts.
pub struct SamPredictor<'a> {
    sam: &'a Sam,
    image: Option<EmbeddedImage>,
}

impl<'a> SamPredictor<'a> {
    pub(crate) fn new(sam: &'a Sam) -> Self {
        Self { sam, image: None }
    }

    /// Set the image to predict masks for.
    pub fn set_image(&mut self, image: &DynamicImage) -> anyhow::Result<()> {
        let tensor = preprocess::image_to_tensor(image, &self.sam.device)?;
        self.image = Some(EmbeddedImage {
            tensor,
            original_width: image.width(),
            original_height: image.height(),
        });
        Ok(())
    }

    /// Predict segmentation masks for the current image.
    ///
    /// The returned masks have the dimensions of the original image.
    pub fn predict(&self, prompt: &SamPrompt) -> anyhow::Result<MaskPrediction> {
        let image = self
            .image
            .as_ref()
            .context("no image has been set, call set_image before predict")?;

        let points = prompt.points();
        let (masks, iou_predictions) =
            self.sam
                .model
                .forward(&image.tensor, &points, prompt.multimask)?;

        let masks = masks.ge(prompt.threshold)?;
        let (candidates, _height, _width) = masks.dims3()?;
        let scores = iou_predictions.flatten_all()?.to_vec1::<f32>()?;

        let mut ranked = Vec::with_capacity(candidates);
        for index in 0..candidates {
            let mask = Mask::from_mask_tensor(&masks.i(index)?)?
                .with_score(scores.get(index).copied().unwrap_or(0.))
                .resized(image.original_width, image.original_height);
            ranked.push(mask);
        }

        MaskPrediction::new(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_points_come_before_avoid_points() {
        let prompt = SamPrompt::new()
            .add_goal_point(0.5, 0.25)
            .add_avoid_point(0.1, 0.9);
        assert_eq!(
            prompt.points(),
            vec![(0.5, 0.25, true), (0.1, 0.9, false)]
        );
    }

    #[test]
    fn the_default_prompt_is_empty() {
        let prompt = SamPrompt::default();
        assert!(prompt.points().is_empty());
        assert!(!prompt.multimask);
        assert_eq!(prompt.threshold, 0.);
    }

    #[test]
    fn predictions_are_ranked_by_score() {
        let low = Mask::from_bitmap(1, 1, vec![false]).unwrap().with_score(0.1);
        let high = Mask::from_bitmap(1, 1, vec![true]).unwrap().with_score(0.9);
        let prediction = MaskPrediction::new(vec![low, high]).unwrap();
        assert_eq!(prediction.best().score(), Some(0.9));
        assert_eq!(prediction.masks().len(), 2);
    }

    #[test]
    fn empty_predictions_are_an_error() {
        assert!(MaskPrediction::new(Vec::new()).is_err());
    }
}
