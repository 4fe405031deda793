use image::DynamicImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;

/// Side length of the square input the classifier was trained on.
pub const INPUT_SIZE: u32 = 224;

/// Batch of one RGB image in NHWC order, values in `[0, 1]`.
pub type PreprocessedTensor = Array4<f32>;

pub fn preprocess(image: &DynamicImage) -> PreprocessedTensor {
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let side = INPUT_SIZE as usize;
    Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}
