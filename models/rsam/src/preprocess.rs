use candle_core::{Device, Tensor};
use candle_transformers::models::segment_anything::sam;
use image::DynamicImage;

/// Scale `(width, height)` so the longest side equals `target` while
/// preserving the aspect ratio. Returns the new `(width, height)`.
pub(crate) fn resize_longest_side(width: u32, height: u32, target: u32) -> (u32, u32) {
    if height < width {
        (target, (target * height) / width)
    } else {
        ((target * width) / height, target)
    }
}

/// Resize an image to the model input resolution and convert it to a
/// channel-first `(3, height, width)` u8 tensor on `device`.
pub(crate) fn image_to_tensor(image: &DynamicImage, device: &Device) -> anyhow::Result<Tensor> {
    let (width, height) =
        resize_longest_side(image.width(), image.height(), sam::IMAGE_SIZE as u32);
    let image = image.resize_exact(width, height, image::imageops::FilterType::CatmullRom);
    let (height, width) = (image.height() as usize, image.width() as usize);
    let data = image.to_rgb8().into_raw();
    let tensor = Tensor::from_vec(data, (height, width, 3), device)?.permute((2, 0, 1))?;
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_longest_side_becomes_the_target() {
        assert_eq!(resize_longest_side(2048, 1024, 1024), (1024, 512));
        assert_eq!(resize_longest_side(1024, 2048, 1024), (512, 1024));
        assert_eq!(resize_longest_side(512, 512, 1024), (1024, 1024));
    }

    #[test]
    fn neither_side_exceeds_the_target() {
        for (w, h) in [(1, 1), (3000, 17), (17, 3000), (1023, 1025)] {
            let (w, h) = resize_longest_side(w, h, 1024);
            assert!(w <= 1024 && h <= 1024);
            assert_eq!(w.max(h), 1024);
        }
    }

    #[test]
    fn images_become_channel_first_tensors() {
        let image = DynamicImage::new_rgb8(64, 32);
        let tensor = image_to_tensor(&image, &Device::Cpu).unwrap();
        let (channels, height, width) = tensor.dims3().unwrap();
        assert_eq!(channels, 3);
        // 64x32 input, longest side scaled to 1024
        assert_eq!((width, height), (1024, 512));
    }
}
