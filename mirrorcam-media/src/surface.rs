//! Offscreen RGBA drawing surface
//!
//! Every mirrored output (photo, recording) goes through a [`Surface`]: the
//! source frame is scaled to the surface size when needed and then flipped
//! horizontally, so pixel `(x, y)` of the surface equals source pixel
//! `(width - 1 - x, y)`.

use crate::devices::VideoResolution;
use crate::error::{MediaError, MediaResult};
use crate::tracks::VideoFrame;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

/// Offscreen canvas
#[derive(Debug, Clone)]
pub struct Surface {
    image: RgbaImage,
    draws: u64,
}

impl Surface {
    /// Blank (fully transparent) surface
    pub fn new(resolution: VideoResolution) -> MediaResult<Self> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("surface size {} has a zero dimension", resolution),
            });
        }
        Ok(Self {
            image: RgbaImage::new(resolution.width, resolution.height),
            draws: 0,
        })
    }

    pub fn resolution(&self) -> VideoResolution {
        let (width, height) = self.image.dimensions();
        VideoResolution::new(width, height)
    }

    /// Draw `frame` flipped horizontally, scaled to the surface size
    pub fn draw_mirrored(&mut self, frame: &VideoFrame) -> MediaResult<()> {
        let source = frame.to_image()?;
        let (width, height) = self.image.dimensions();
        let fitted = if source.dimensions() == (width, height) {
            source
        } else {
            imageops::resize(&source, width, height, FilterType::Triangle)
        };
        self.image = imageops::flip_horizontal(&fitted);
        self.draws += 1;
        Ok(())
    }

    /// Copy of the current contents
    pub fn snapshot(&self, timestamp: u64) -> VideoFrame {
        VideoFrame::from_image(self.image.clone(), timestamp)
    }

    /// Encode the current contents as PNG
    pub fn encode_png(&self) -> MediaResult<Vec<u8>> {
        let mut png = Vec::new();
        let (width, height) = self.image.dimensions();
        PngEncoder::new(&mut png).write_image(
            self.image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        )?;
        Ok(png)
    }

    /// Number of frames drawn so far
    pub fn draw_count(&self) -> u64 {
        self.draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::new();
        for _ in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8 * 10, 0, 0, 255]);
            }
        }
        VideoFrame::new(width, height, data, 0).unwrap()
    }

    #[test]
    fn test_draw_mirrored_same_size() {
        let frame = striped(8, 2);
        let mut surface = Surface::new(frame.resolution()).unwrap();
        surface.draw_mirrored(&frame).unwrap();

        let out = surface.snapshot(1);
        for x in 0..8 {
            assert_eq!(out.pixel(x, 1), frame.pixel(7 - x, 1));
        }
        assert_eq!(surface.draw_count(), 1);
    }

    #[test]
    fn test_draw_scales_to_surface() {
        let frame = VideoFrame::solid(4, 4, [9, 8, 7, 255], 0);
        let mut surface = Surface::new(VideoResolution::new(16, 12)).unwrap();
        surface.draw_mirrored(&frame).unwrap();

        let out = surface.snapshot(0);
        assert_eq!(out.resolution(), VideoResolution::new(16, 12));
        assert_eq!(out.pixel(15, 11), Some([9, 8, 7, 255]));
    }

    #[test]
    fn test_png_signature() {
        let surface = Surface::new(VideoResolution::new(2, 2)).unwrap();
        let png = surface.encode_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(Surface::new(VideoResolution::new(0, 10)).is_err());
    }
}
