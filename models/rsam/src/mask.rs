use candle_core::{DType, Tensor};
use image::GrayImage;

/// The bounding box and stability score of a mask produced by automatic
/// mask generation, in the coordinate space of the mask itself.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskRegion {
    /// The left edge of the region
    pub x_min: f32,
    /// The top edge of the region
    pub y_min: f32,
    /// The right edge of the region
    pub x_max: f32,
    /// The bottom edge of the region
    pub y_max: f32,
}

/// A per-pixel boolean segmentation mask.
///
/// `true` marks a foreground pixel. Masks predicted for an image have the
/// same dimensions as that image.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
    score: Option<f32>,
    region: Option<MaskRegion>,
}

impl Mask {
    /// Creates a mask from a row-major bitmap.
    pub fn from_bitmap(width: u32, height: u32, data: Vec<bool>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            data.len() == width as usize * height as usize,
            "mask bitmap has {} pixels, expected {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            data,
            score: None,
            region: None,
        })
    }

    pub(crate) fn from_flat_u8(width: u32, height: u32, data: Vec<u8>) -> anyhow::Result<Self> {
        Self::from_bitmap(width, height, data.into_iter().map(|v| v != 0).collect())
    }

    /// Creates a mask from a `(height, width)` tensor of zero/non-zero values.
    pub(crate) fn from_mask_tensor(tensor: &Tensor) -> anyhow::Result<Self> {
        let (height, width) = tensor.dims2()?;
        let data = tensor
            .to_dtype(DType::U8)?
            .flatten_all()?
            .to_vec1::<u8>()?;
        Self::from_flat_u8(width as u32, height as u32, data)
    }

    pub(crate) fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub(crate) fn with_region(mut self, region: MaskRegion) -> Self {
        self.region = Some(region);
        self
    }

    /// The width of the mask in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height of the mask in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The model's predicted quality of this mask, if one was produced.
    ///
    /// Prediction fills this with the predicted IoU; automatic mask
    /// generation fills it with the region's stability score.
    pub fn score(&self) -> Option<f32> {
        self.score
    }

    /// The bounding box this mask was generated from, if it came from
    /// [`crate::Sam::segment_everything`].
    pub fn region(&self) -> Option<MaskRegion> {
        self.region
    }

    /// Whether the pixel at `(x, y)` is foreground.
    ///
    /// Panics if `(x, y)` is outside the mask.
    pub fn get(&self, x: u32, y: u32) -> bool {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// The number of foreground pixels.
    pub fn area(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Render the mask as an 8-bit grayscale image with foreground pixels
    /// set to 255.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    /// Nearest-neighbor rescale to `(width, height)`, keeping the bitmap boolean.
    pub(crate) fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let src_y = ((y as u64 * self.height as u64) / height as u64).min(self.height as u64 - 1);
            for x in 0..width {
                let src_x =
                    ((x as u64 * self.width as u64) / width as u64).min(self.width as u64 - 1);
                data.push(self.data[src_y as usize * self.width as usize + src_x as usize]);
            }
        }
        let x_scale = width as f32 / self.width as f32;
        let y_scale = height as f32 / self.height as f32;
        Self {
            width,
            height,
            data,
            score: self.score,
            region: self.region.map(|region| MaskRegion {
                x_min: region.x_min * x_scale,
                y_min: region.y_min * y_scale,
                x_max: region.x_max * x_scale,
                y_max: region.y_max * y_scale,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmaps_must_match_their_dimensions() {
        assert!(Mask::from_bitmap(2, 2, vec![true; 4]).is_ok());
        assert!(Mask::from_bitmap(2, 2, vec![true; 3]).is_err());
    }

    #[test]
    fn area_counts_foreground_pixels() {
        let mask = Mask::from_bitmap(2, 2, vec![true, false, false, true]).unwrap();
        assert_eq!(mask.area(), 2);
        assert!(mask.get(0, 0));
        assert!(!mask.get(1, 0));
        assert!(mask.get(1, 1));
    }

    #[test]
    fn masks_render_as_binary_grayscale_images() {
        let mask = Mask::from_bitmap(2, 1, vec![true, false]).unwrap();
        let image = mask.to_image();
        assert_eq!((image.width(), image.height()), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [255]);
        assert_eq!(image.get_pixel(1, 0).0, [0]);
    }

    #[test]
    fn rescaling_keeps_the_bitmap_boolean() {
        // left half foreground
        let mask = Mask::from_bitmap(2, 2, vec![true, false, true, false]).unwrap();
        let resized = mask.resized(4, 4);
        assert_eq!((resized.width(), resized.height()), (4, 4));
        assert_eq!(resized.area(), 8);
        assert!(resized.get(0, 0));
        assert!(resized.get(1, 3));
        assert!(!resized.get(2, 0));
        assert!(!resized.get(3, 3));
    }

    #[test]
    fn tensor_masks_round_trip() {
        let tensor =
            Tensor::from_vec(vec![0u8, 1, 1, 0, 0, 1], (2, 3), &candle_core::Device::Cpu).unwrap();
        let mask = Mask::from_mask_tensor(&tensor).unwrap();
        assert_eq!((mask.width(), mask.height()), (3, 2));
        assert_eq!(mask.area(), 3);
        assert!(mask.get(1, 0));
        assert!(!mask.get(0, 1));
    }
}
