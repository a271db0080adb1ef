use image::imageops::FilterType;
use image::{ImageError, RgbImage};
use ndarray::Array4;

/// NHWC batch of one image with channels scaled to [0, 1].
pub type NormalizedTensor = Array4<f32>;

/// Side length the model was trained on.
pub const INPUT_SIZE: u32 = 224;

const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

pub fn decode_rgb(data: &[u8]) -> Result<RgbImage, ImageError> {
    let img = image::load_from_memory(data)?;
    Ok(img.to_rgb8())
}

pub fn to_tensor(img: &RgbImage) -> NormalizedTensor {
    let resized = image::imageops::resize(img, INPUT_SIZE, INPUT_SIZE, RESIZE_FILTER);
    let side = INPUT_SIZE as usize;
    Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

pub fn preprocess(data: &[u8]) -> Result<NormalizedTensor, ImageError> {
    let img = decode_rgb(data)?;
    Ok(to_tensor(&img))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    pub(crate) fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn tensor_has_batch_nhwc_shape() {
        let tensor = preprocess(&encoded_image(320, 240, ImageFormat::Png)).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
    }

    #[test]
    fn values_are_scaled_into_unit_interval() {
        let tensor = preprocess(&encoded_image(64, 48, ImageFormat::Png)).unwrap();
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn same_bytes_give_bit_identical_tensors() {
        let bytes = encoded_image(300, 200, ImageFormat::Jpeg);
        let first = preprocess(&bytes).unwrap();
        let second = preprocess(&bytes).unwrap();
        let first_bits: Vec<u32> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u32> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn already_sized_image_keeps_exact_pixels() {
        let bytes = encoded_image(224, 224, ImageFormat::Png);
        let tensor = preprocess(&bytes).unwrap();
        let img = decode_rgb(&bytes).unwrap();
        let px = img.get_pixel(10, 20);
        assert_eq!(tensor[[0, 20, 10, 0]], px[0] as f32 / 255.0);
        assert_eq!(tensor[[0, 20, 10, 2]], px[2] as f32 / 255.0);
    }

    #[test]
    fn grayscale_input_is_expanded_to_three_channels() {
        let gray = image::GrayImage::from_pixel(50, 50, image::Luma([128]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();

        let tensor = preprocess(&buf.into_inner()).unwrap();
        assert_eq!(tensor.shape()[3], 3);
        assert_eq!(tensor[[0, 0, 0, 0]], tensor[[0, 0, 0, 1]]);
    }

    #[test]
    fn text_renamed_as_jpeg_fails_to_decode() {
        let err = preprocess(b"this is definitely not an image").unwrap_err();
        assert!(matches!(
            err,
            ImageError::Unsupported(_) | ImageError::Decoding(_)
        ));
    }
}
