// THEORY:
// Debug dumps of what the detector sees. Depth frames and the learned background are
// written as 16-bit greyscale PNGs in millimetres, so a pixel value read back in any
// image viewer is the depth itself. A missing reading stays black.

pub mod image_helper {
    use crate::core_modules::background_model::BackgroundModel;
    use crate::core_modules::frame::DepthFrame;
    use crate::error::{DetectionError, Result};
    use image::{ImageBuffer, Luma};
    use std::path::Path;

    type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

    fn to_image(width: u32, height: u32, data: Vec<u16>) -> Result<DepthImage> {
        let expected = (width as usize) * (height as usize);
        let actual = data.len();
        ImageBuffer::from_raw(width, height, data)
            .ok_or(DetectionError::buffer_mismatch(expected, actual))
    }

    pub fn save_depth_png(path: impl AsRef<Path>, frame: &DepthFrame) -> Result<()> {
        frame.validate()?;
        to_image(frame.width, frame.height, frame.depth_data.clone())?.save(path)?;
        Ok(())
    }

    /// Writes the background baseline, rounded to whole millimetres.
    pub fn save_background_png(path: impl AsRef<Path>, background: &BackgroundModel) -> Result<()> {
        let data = background
            .depths()
            .iter()
            .map(|&d| d.round().clamp(0.0, f32::from(u16::MAX)) as u16)
            .collect();
        to_image(background.width(), background.height(), data)?.save(path)?;
        Ok(())
    }

    /// Reads a 16-bit greyscale PNG back as a depth frame.
    pub fn load_depth_png(path: impl AsRef<Path>, timestamp: f64, frame_number: u32) -> Result<DepthFrame> {
        let image = image::open(path)?.into_luma16();
        let (width, height) = image.dimensions();
        DepthFrame::new(image.into_raw(), width, height, timestamp, frame_number)
    }
}
