//! AVIF decoding from memory: `avif-parse` for the container, `rav1d` for the
//! AV1 payload, and a BT.601 YUV→RGB conversion.
//!
//! The `image` crate's `"avif"` feature only provides the encoder (rav1e).
//! Decoding through `image` requires `"avif-native"`, which links the C
//! library dav1d; `rav1d` is its pure Rust port.
//!
//! The rav1d context and picture are owned by small guards that release them
//! on drop. Planes are copied out of the picture into 16-bit sample buffers
//! before conversion, so the colour math never touches raw pointers.

use super::backend::{BackendError, Dimensions};
use image::DynamicImage;
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::{Dav1dContext, Dav1dSettings};
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as dav1d;
use std::ffi::c_void;
use std::io::Cursor;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Whether `bytes` start with an ISO-BMFF `ftyp` box branded `avif` / `avis`.
pub fn sniff(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"avif" | b"avis")
}

fn parse(bytes: &[u8]) -> Result<avif_parse::AvifData, BackendError> {
    avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::Decode(format!("Failed to parse AVIF container: {e:?}")))
}

/// Dimensions from the container metadata, without decoding the AV1 payload.
pub fn identify(bytes: &[u8]) -> Result<Dimensions, BackendError> {
    let avif = parse(bytes)?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| BackendError::Decode(format!("Failed to read AVIF metadata: {e:?}")))?;
    Ok(Dimensions::new(
        meta.max_frame_width.get(),
        meta.max_frame_height.get(),
    ))
}

/// Decode the primary item to RGB8.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    let avif = parse(bytes)?;
    let mut decoder = Av1Decoder::open()?;
    decoder.send(&avif.primary_item)?;
    let picture = decoder.picture()?;
    let frame = picture.frame()?;

    let (width, height) = (frame.width as u32, frame.height as u32);
    image::RgbImage::from_raw(width, height, frame.to_rgb())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::Decode("Decoded AVIF buffer has the wrong length".into()))
}

fn check(code: i32, step: &str) -> Result<(), BackendError> {
    if code == 0 {
        Ok(())
    } else {
        Err(BackendError::Decode(format!("rav1d {step} failed ({code})")))
    }
}

/// Single-threaded rav1d context, closed on drop.
struct Av1Decoder {
    ctx: Option<Dav1dContext>,
}

impl Av1Decoder {
    fn open() -> Result<Self, BackendError> {
        let mut settings = MaybeUninit::<Dav1dSettings>::uninit();
        // SAFETY: the pointer is valid for writing one settings struct, which
        // dav1d_default_settings fully initializes.
        let mut settings = unsafe {
            dav1d::dav1d_default_settings(NonNull::from(&mut settings).cast());
            settings.assume_init()
        };
        settings.n_threads = 1;
        settings.max_frame_delay = 1;

        let mut decoder = Self { ctx: None };
        // SAFETY: both pointers come from live exclusive borrows.
        let rc = unsafe {
            dav1d::dav1d_open(
                Some(NonNull::from(&mut decoder.ctx)),
                Some(NonNull::from(&mut settings)),
            )
        };
        check(rc.0, "open")?;
        Ok(decoder)
    }

    /// Hand the whole AV1 payload to the decoder.
    fn send(&mut self, payload: &[u8]) -> Result<(), BackendError> {
        let mut data = Dav1dData::default();
        // SAFETY: `data` is a live Dav1dData for rav1d to fill in.
        let buf = unsafe { dav1d::dav1d_data_create(Some(NonNull::from(&mut data)), payload.len()) };
        if buf.is_null() {
            return Err(BackendError::Decode("rav1d data_create failed".into()));
        }
        // SAFETY: data_create returned `payload.len()` writable bytes at `buf`.
        unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), buf, payload.len()) };

        // SAFETY: `ctx` is open and `data` was created above.
        let rc = unsafe { dav1d::dav1d_send_data(self.ctx, Some(NonNull::from(&mut data))) };
        if rc.0 != 0 {
            // SAFETY: the decoder did not take the data, so it is still ours.
            unsafe { dav1d::dav1d_data_unref(Some(NonNull::from(&mut data))) };
        }
        check(rc.0, "send_data")
    }

    fn picture(&mut self) -> Result<Picture, BackendError> {
        let mut raw = Dav1dPicture::default();
        // SAFETY: `ctx` is open and `raw` is a live picture to write into.
        let rc = unsafe { dav1d::dav1d_get_picture(self.ctx, Some(NonNull::from(&mut raw))) };
        check(rc.0, "get_picture")?;
        Ok(Picture(raw))
    }
}

impl Drop for Av1Decoder {
    fn drop(&mut self) {
        // SAFETY: closing an unopened (None) context is a no-op.
        unsafe { dav1d::dav1d_close(Some(NonNull::from(&mut self.ctx))) };
    }
}

/// A picture returned by rav1d, released on drop.
struct Picture(Dav1dPicture);

impl Picture {
    /// Copy the planes out into a [`Frame`].
    fn frame(&self) -> Result<Frame, BackendError> {
        let params = &self.0.p;
        let width = usize::try_from(params.w)
            .map_err(|_| BackendError::Decode(format!("Invalid AVIF width {}", params.w)))?;
        let height = usize::try_from(params.h)
            .map_err(|_| BackendError::Decode(format!("Invalid AVIF height {}", params.h)))?;
        let depth = params.bpc as u32;
        if !(1..=16).contains(&depth) {
            return Err(BackendError::Decode(format!("Unsupported AVIF bit depth {depth}")));
        }
        let wide = depth > 8;
        let layout = params.layout;

        let shifts = match layout {
            DAV1D_PIXEL_LAYOUT_I400 => None,
            DAV1D_PIXEL_LAYOUT_I420 => Some((1, 1)),
            DAV1D_PIXEL_LAYOUT_I422 => Some((1, 0)),
            DAV1D_PIXEL_LAYOUT_I444 => Some((0, 0)),
            _ => {
                return Err(BackendError::Decode(format!(
                    "Unsupported AVIF pixel layout: {layout}"
                )));
            }
        };
        let missing = || BackendError::Decode("AVIF picture is missing a plane".into());

        let [y, u, v] = self.0.data;
        let [luma_stride, chroma_stride] = self.0.stride;
        // SAFETY: rav1d guarantees each plane covers its dimensions at its stride.
        let luma = unsafe { Plane::copy(y.ok_or_else(missing)?, luma_stride, width, height, wide) };
        let chroma = match shifts {
            None => None,
            Some((shift_x, shift_y)) => {
                let (u, v) = (u.ok_or_else(missing)?, v.ok_or_else(missing)?);
                let cw = (width + shift_x) >> shift_x;
                let ch = (height + shift_y) >> shift_y;
                // SAFETY: as above, for the subsampled chroma extent.
                let (cb, cr) = unsafe {
                    (
                        Plane::copy(u, chroma_stride, cw, ch, wide),
                        Plane::copy(v, chroma_stride, cw, ch, wide),
                    )
                };
                Some(Chroma {
                    cb,
                    cr,
                    shift_x,
                    shift_y,
                })
            }
        };

        Ok(Frame {
            width,
            height,
            depth,
            luma,
            chroma,
        })
    }
}

impl Drop for Picture {
    fn drop(&mut self) {
        // SAFETY: the picture came from a successful dav1d_get_picture.
        unsafe { dav1d::dav1d_picture_unref(Some(NonNull::from(&mut self.0))) };
    }
}

/// One plane as row-major samples; 8-bit input is widened.
struct Plane {
    width: usize,
    samples: Vec<u16>,
}

impl Plane {
    /// # Safety
    ///
    /// `origin` must address `height` rows of `width` samples, rows `stride`
    /// bytes apart, with 2-byte samples when `wide` is set.
    unsafe fn copy(origin: NonNull<c_void>, stride: isize, width: usize, height: usize, wide: bool) -> Self {
        let base = origin.as_ptr().cast::<u8>().cast_const();
        let mut samples = Vec::with_capacity(width * height);
        for row in 0..height {
            let start = unsafe { base.offset(row as isize * stride) };
            if wide {
                samples.extend_from_slice(unsafe { std::slice::from_raw_parts(start.cast::<u16>(), width) });
            } else {
                let line = unsafe { std::slice::from_raw_parts(start, width) };
                samples.extend(line.iter().map(|&s| u16::from(s)));
            }
        }
        Self { width, samples }
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        f32::from(self.samples[y * self.width + x])
    }
}

struct Chroma {
    cb: Plane,
    cr: Plane,
    shift_x: usize,
    shift_y: usize,
}

/// Decoded picture in owned memory.
struct Frame {
    width: usize,
    height: usize,
    depth: u32,
    luma: Plane,
    /// `None` for monochrome.
    chroma: Option<Chroma>,
}

impl Frame {
    /// Interleaved RGB8, scaled down from the source bit depth.
    fn to_rgb(&self) -> Vec<u8> {
        let scale = 255.0 / ((1u32 << self.depth) - 1) as f32;
        let mid = (1u32 << (self.depth - 1)) as f32;

        let mut rgb = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let luma = self.luma.at(x, y);
                let pixel = match &self.chroma {
                    None => [luma; 3],
                    Some(c) => {
                        let (cx, cy) = (x >> c.shift_x, y >> c.shift_y);
                        bt601(luma, c.cb.at(cx, cy) - mid, c.cr.at(cx, cy) - mid)
                    }
                };
                rgb.extend(pixel.map(|v| (v * scale).round().clamp(0.0, 255.0) as u8));
            }
        }
        rgb
    }
}

/// Full-range BT.601, in sample units with chroma centred on zero.
fn bt601(y: f32, cb: f32, cr: f32) -> [f32; 3] {
    [
        y + 1.402 * cr,
        y - 0.344136 * cb - 0.714136 * cr,
        y + 1.772 * cb,
    ]
}
