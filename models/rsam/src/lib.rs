//! # rsam
//!
//! A rust wrapper for [Segment Anything](https://segment-anything.com/) pretrained
//! checkpoints implemented in [Candle](https://github.com/huggingface/candle)
//!
//! ## Usage
//!
//! ```rust, no_run
//! use rsam::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sam = Sam::builder().build().await?;
//!     let image = image::open("examples/landscape.jpg")?;
//!
//!     let mut predictor = sam.predictor();
//!     predictor.set_image(&image)?;
//!     let prediction = predictor.predict(&SamPrompt::default())?;
//!     prediction.best().to_image().save("mask.png")?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::segment_anything::sam;
use image::DynamicImage;

mod mask;
mod predictor;
mod preprocess;
mod source;

pub use crate::mask::*;
pub use crate::predictor::*;
pub use crate::source::*;
pub use rsam_common::{FileSource, ModelLoadingProgress};

/// A builder for a [`Sam`] model.
#[derive(Default)]
pub struct SamBuilder {
    source: SamSource,

    cpu: bool,
}

impl SamBuilder {
    /// Sets the source of the checkpoint.
    pub fn source(mut self, source: SamSource) -> Self {
        self.source = source;
        self
    }

    /// Set to true to run the model on CPU.
    pub fn cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    /// Builds the [`Sam`] model.
    pub async fn build(self) -> anyhow::Result<Sam> {
        self.build_with_loading_handler(ModelLoadingProgress::multi_bar_loading_indicator())
            .await
    }

    /// Builds the [`Sam`] model with a loading handler.
    pub async fn build_with_loading_handler(
        self,
        loading_handler: impl FnMut(ModelLoadingProgress) + Send + 'static,
    ) -> anyhow::Result<Sam> {
        Sam::from_builder(self, loading_handler).await
    }
}

/// The [segment anything](https://segment-anything.com/) model.
pub struct Sam {
    pub(crate) device: Device,
    pub(crate) model: sam::Sam,
}

impl Sam {
    /// Creates a new [`SamBuilder`].
    pub fn builder() -> SamBuilder {
        SamBuilder::default()
    }

    /// Create a new model with the default (tiny) checkpoint.
    pub async fn new() -> anyhow::Result<Self> {
        Self::builder().build().await
    }

    async fn from_builder(
        builder: SamBuilder,
        mut progress_handler: impl FnMut(ModelLoadingProgress) + Send + 'static,
    ) -> anyhow::Result<Self> {
        let SamBuilder { source, cpu } = builder;
        let SamSource { model, kind } = source;

        let checkpoint_source = format!("Checkpoint ({})", model);
        let mut create_progress = ModelLoadingProgress::downloading_progress(checkpoint_source);
        let checkpoint = model
            .download(|progress| progress_handler(create_progress(progress)))
            .await?;

        tracing::debug!("Loading {:?} checkpoint from {}", kind, checkpoint.display());

        let device = if cpu {
            Device::Cpu
        } else {
            rsam_common::accelerated_device_if_available()?
        };
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[&checkpoint], DType::F32, &device)? };
        let model = match kind.encoder_params() {
            // tiny vit_t
            None => sam::Sam::new_tiny(vb)?,
            Some(params) => sam::Sam::new(
                params.embed_dim,
                params.depth,
                params.num_heads,
                params.global_attn_indexes,
                vb,
            )?,
        };

        Ok(Self { device, model })
    }

    /// Creates a [`SamPredictor`] over this model.
    pub fn predictor(&self) -> SamPredictor<'_> {
        SamPredictor::new(self)
    }

    /// Segment everything in an image. Returns one [`Mask`] per region the
    /// model finds, each with its bounding box and stability score.
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// use rsam::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let sam = Sam::builder().build().await?;
    ///     let image = image::open("examples/landscape.jpg")?;
    ///     let masks = sam.segment_everything(&image)?;
    ///     for (i, mask) in masks.iter().enumerate() {
    ///         mask.to_image().save(format!("{i}.png"))?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn segment_everything(&self, image: &DynamicImage) -> anyhow::Result<Vec<Mask>> {
        let (original_width, original_height) = (image.width(), image.height());
        let image = preprocess::image_to_tensor(image, &self.device)?;

        let bboxes = self.model.generate_masks(&image, 32, 0, 512. / 1500., 1)?;
        let mut masks = Vec::with_capacity(bboxes.len());
        for bbox in bboxes {
            let mask = Mask::from_mask_tensor(&bbox.data)?
                .with_score(bbox.confidence)
                .with_region(MaskRegion {
                    x_min: bbox.xmin,
                    y_min: bbox.ymin,
                    x_max: bbox.xmax,
                    y_max: bbox.ymax,
                })
                .resized(original_width, original_height);
            masks.push(mask);
        }

        Ok(masks)
    }
}
