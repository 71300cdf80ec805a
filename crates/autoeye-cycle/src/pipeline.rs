//! Image pipeline: decode, crop/resize, re-encode
//!
//! A single [`PixelBuffer`] flows through the stages. It is decoded at sensor
//! resolution, center-cropped and interpolated to model resolution in the same
//! allocation, and finally JPEG-encoded into a bounded thumbnail buffer. Every
//! byte the stages hold is acquired from the [`BufferLedger`].

use std::io::{self, Write};

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::buffer::{BufferLedger, CaptureFrame, PixelBuffer, ScopedBuffer};
use crate::camera::FrameSource;
use crate::config::CycleConfig;
use crate::error::{CycleError, Result};
use crate::types::Resolution;

/// Stateless orchestration of the image stages for one configuration
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    sensor: Resolution,
    model: Resolution,
    buffer_bytes: usize,
    jpeg_quality: u8,
    max_thumbnail_bytes: usize,
}

impl ImagePipeline {
    pub fn new(config: &CycleConfig) -> Self {
        Self {
            sensor: config.sensor_resolution,
            model: config.model_resolution,
            buffer_bytes: config.pixel_buffer_bytes(),
            jpeg_quality: config.jpeg_quality,
            max_thumbnail_bytes: config.max_thumbnail_bytes,
        }
    }

    /// Acquire the cycle pixel buffer and decode `frame` into it.
    ///
    /// On error the buffer is released before returning; partial output is
    /// never handed on.
    pub fn decode(
        &self,
        source: &mut FrameSource,
        frame: &CaptureFrame,
        ledger: &BufferLedger,
    ) -> Result<PixelBuffer> {
        let mut pixels = PixelBuffer::acquire(ledger, self.buffer_bytes, self.sensor)?;
        source.decode(frame, &mut pixels)?;
        Ok(pixels)
    }

    /// Center-crop to the model aspect ratio and interpolate to model
    /// resolution.
    ///
    /// When the crop window is at least the model size in both dimensions
    /// the output is written over the front of the same buffer. Upscaling
    /// goes through a ledger-counted scratch buffer of model size that is
    /// released before returning.
    pub fn resize(&self, mut pixels: PixelBuffer, ledger: &BufferLedger) -> Result<PixelBuffer> {
        let src = pixels.resolution();
        if src != self.sensor {
            return Err(CycleError::Resize(format!(
                "expected {} input, got {}",
                self.sensor, src
            )));
        }

        let scaler = CropScaler::new(src, self.model);
        if scaler.in_place() {
            let bytes = pixels.as_bytes_mut();
            for (i, (ox, oy)) in scaler.targets().enumerate() {
                let px = scaler.sample(bytes, ox, oy);
                bytes[i * 3..i * 3 + 3].copy_from_slice(&px);
            }
            pixels.truncate_to(self.model)?;
        } else {
            let mut scratch = ledger.acquire(self.model.rgb_bytes())?;
            // Cannot fail: reserved exactly this much
            let _ = scratch.resize_zeroed(self.model.rgb_bytes());
            let out = scratch.as_mut_slice();
            for (i, (ox, oy)) in scaler.targets().enumerate() {
                let px = scaler.sample(pixels.as_bytes(), ox, oy);
                out[i * 3..i * 3 + 3].copy_from_slice(&px);
            }
            pixels.overwrite(self.model, scratch.as_slice())?;
        }
        Ok(pixels)
    }

    /// JPEG-encode the model-resolution buffer into a bounded thumbnail.
    ///
    /// Failures here are not fatal to the cycle; the caller publishes without
    /// a thumbnail.
    pub fn reencode(&self, pixels: &PixelBuffer, ledger: &BufferLedger) -> Result<Thumbnail> {
        let res = pixels.resolution();
        if res != self.model {
            return Err(CycleError::Encode(format!(
                "expected {} source, got {}",
                self.model, res
            )));
        }

        let mut jpeg = ledger
            .acquire(self.max_thumbnail_bytes)
            .map_err(|e| CycleError::Encode(e.to_string()))?;
        {
            let mut writer = BoundedWriter { buf: &mut jpeg };
            JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
                .encode(pixels.as_bytes(), res.width, res.height, ExtendedColorType::Rgb8)
                .map_err(|e| CycleError::Encode(e.to_string()))?;
        }
        if jpeg.is_empty() {
            return Err(CycleError::Encode("encoder produced no output".into()));
        }
        Ok(Thumbnail { jpeg })
    }
}

/// Encoded thumbnail held in a ledger-counted buffer
#[derive(Debug)]
pub struct Thumbnail {
    jpeg: ScopedBuffer,
}

impl Thumbnail {
    pub fn as_bytes(&self) -> &[u8] {
        self.jpeg.as_slice()
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    /// Standard base64 of the JPEG bytes
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.as_bytes())
    }
}

/// Writer that errors instead of growing past the buffer's reservation
struct BoundedWriter<'a> {
    buf: &'a mut ScopedBuffer,
}

impl Write for BoundedWriter<'_> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }
        match self.buf.append_bounded(bytes) {
            0 => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!(
                    "thumbnail exceeds {} byte output buffer",
                    self.buf.capacity()
                ),
            )),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Largest centered window of `src` with the aspect ratio of `dst`.
///
/// Returns `(x, y, width, height)`.
fn center_crop(src: Resolution, dst: Resolution) -> (u32, u32, u32, u32) {
    let (sw, sh) = (src.width as u64, src.height as u64);
    let (dw, dh) = (dst.width as u64, dst.height as u64);

    if sw * dh > dw * sh {
        // Source is wider: trim left and right
        let cw = ((sh * dw) / dh).clamp(1, sw);
        (((sw - cw) / 2) as u32, 0, cw as u32, sh as u32)
    } else {
        // Source is taller (or equal): trim top and bottom
        let ch = ((sw * dh) / dw).clamp(1, sh);
        (0, ((sh - ch) / 2) as u32, sw as u32, ch as u32)
    }
}

/// Bilinear sampler over the center-crop window of a packed RGB image.
///
/// Output pixel centers map onto the crop window; neighbours are clamped to
/// its edges.
struct CropScaler {
    stride: usize,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    out: Resolution,
    sx: f32,
    sy: f32,
}

impl CropScaler {
    fn new(src: Resolution, out: Resolution) -> Self {
        let (x, y, w, h) = center_crop(src, out);
        Self {
            stride: src.width as usize,
            x,
            y,
            w,
            h,
            out,
            sx: w as f32 / out.width as f32,
            sy: h as f32 / out.height as f32,
        }
    }

    /// Whether output can overwrite the source front to back.
    ///
    /// With a scale factor of at least one on both axes, output pixel `i`
    /// only reads source pixels at index `i` or later.
    fn in_place(&self) -> bool {
        self.w >= self.out.width && self.h >= self.out.height
    }

    /// Output coordinates in row-major order
    fn targets(&self) -> impl Iterator<Item = (u32, u32)> {
        let (width, height) = (self.out.width, self.out.height);
        (0..height).flat_map(move |oy| (0..width).map(move |ox| (ox, oy)))
    }

    fn sample(&self, src: &[u8], ox: u32, oy: u32) -> [u8; 3] {
        let fx = ((ox as f32 + 0.5) * self.sx - 0.5).clamp(0.0, (self.w - 1) as f32);
        let fy = ((oy as f32 + 0.5) * self.sy - 0.5).clamp(0.0, (self.h - 1) as f32);
        let (x0, y0) = (fx as u32, fy as u32);
        let (x1, y1) = ((x0 + 1).min(self.w - 1), (y0 + 1).min(self.h - 1));
        let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

        let at = |x: u32, y: u32| {
            ((self.y + y) as usize * self.stride + (self.x + x) as usize) * 3
        };
        let (a, b, c, d) = (at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1));

        let mut px = [0u8; 3];
        for (ch, out) in px.iter_mut().enumerate() {
            let top = src[a + ch] as f32 * (1.0 - tx) + src[b + ch] as f32 * tx;
            let bottom = src[c + ch] as f32 * (1.0 - tx) + src[d + ch] as f32 * tx;
            *out = (top * (1.0 - ty) + bottom * ty).round() as u8;
        }
        px
    }
}
