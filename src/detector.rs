//! Detector-side types: the per-series configuration record, the global
//! header detail level, and the dense 2-D buffers carried by an `all`-detail
//! header.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::codec::Compression;
use crate::error::{Result, StreamError};
use crate::json::{require_f64, require_i64, require_str};

/// How much global-header metadata the DCU is configured to send.
///
/// Dictates how many header parts to expect: two for `basic`, eight for
/// `all`. `none` cannot be processed at all — without the detector
/// configuration there is no way to interpret the image frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderDetail {
    #[default]
    Unknown,
    None,
    Basic,
    All,
}

impl HeaderDetail {
    pub fn from_name(name: &str) -> Self {
        match name {
            "none" => HeaderDetail::None,
            "basic" => HeaderDetail::Basic,
            "all" => HeaderDetail::All,
            _ => HeaderDetail::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeaderDetail::Unknown => "unknown",
            HeaderDetail::None => "none",
            HeaderDetail::Basic => "basic",
            HeaderDetail::All => "all",
        }
    }
}

impl fmt::Display for HeaderDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deserialized detector parameters from part 2 of the global header.
///
/// Every field is mandatory on the wire and keeps its JSON name. The record
/// is parsed once per series and read-only afterwards; a fresh series start
/// replaces it wholesale. Defaults are "unset" sentinels: NaN for floats,
/// -1 for integers, empty strings.
#[derive(Debug)]
pub struct DetectorConfig {
    pub beam_center_x: f64, // pixels
    pub beam_center_y: f64, // pixels
    pub bit_depth_image: i64, // always 32
    pub compression: Compression,
    pub count_time: f64, // seconds
    pub countrate_correction_count_cutoff: i64,
    pub description: String,
    pub detector_distance: f64, // metres
    pub detector_number: String,
    pub frame_time: f64, // seconds
    pub nimages: i64,    // images per trigger
    pub ntrigger: i64,   // total images = nimages * ntrigger
    pub omega_start: f64,     // degrees
    pub omega_increment: f64, // degrees
    pub sensor_thickness: f64, // metres
    pub software_version: String,
    pub wavelength: f64, // angstroms
    pub x_pixel_size: f64, // metres
    pub x_pixels_in_detector: i64,
    pub y_pixel_size: f64, // metres
    pub y_pixels_in_detector: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            beam_center_x: f64::NAN,
            beam_center_y: f64::NAN,
            bit_depth_image: -1,
            compression: Compression::Unknown,
            count_time: f64::NAN,
            countrate_correction_count_cutoff: -1,
            description: String::new(),
            detector_distance: f64::NAN,
            detector_number: String::new(),
            frame_time: f64::NAN,
            nimages: -1,
            ntrigger: -1,
            omega_start: f64::NAN,
            omega_increment: f64::NAN,
            sensor_thickness: f64::NAN,
            software_version: String::new(),
            wavelength: f64::NAN,
            x_pixel_size: f64::NAN,
            x_pixels_in_detector: -1,
            y_pixel_size: f64::NAN,
            y_pixels_in_detector: -1,
        }
    }
}

impl DetectorConfig {
    /// Populate a record from the part-2 JSON object. A missing field is a
    /// fatal error naming the field.
    pub fn from_json(obj: &Value) -> Result<Self> {
        let mut cfg = Self::default();

        cfg.beam_center_x = require_f64(obj, "beam_center_x")?;
        cfg.beam_center_y = require_f64(obj, "beam_center_y")?;

        cfg.bit_depth_image = require_i64(obj, "bit_depth_image")?;
        if cfg.bit_depth_image != 32 {
            return Err(StreamError::UnsupportedBitDepth { found: cfg.bit_depth_image });
        }

        let codec_name = require_str(obj, "compression")?;
        cfg.compression = Compression::from_name(codec_name);
        if cfg.compression == Compression::Unknown {
            return Err(StreamError::protocol(
                "detector configuration",
                format!(
                    "compression=\"{}\"; supported values are \"none\", \"lz4\", and \"bslz4\"",
                    codec_name
                ),
            ));
        }

        cfg.count_time = require_f64(obj, "count_time")?;
        cfg.countrate_correction_count_cutoff =
            require_i64(obj, "countrate_correction_count_cutoff")?;
        cfg.description = require_str(obj, "description")?.to_owned();
        cfg.detector_distance = require_f64(obj, "detector_distance")?;
        cfg.detector_number = require_str(obj, "detector_number")?.to_owned();
        cfg.frame_time = require_f64(obj, "frame_time")?;
        cfg.nimages = require_i64(obj, "nimages")?;
        cfg.ntrigger = require_i64(obj, "ntrigger")?;
        cfg.omega_start = require_f64(obj, "omega_start")?;
        cfg.omega_increment = require_f64(obj, "omega_increment")?;
        cfg.sensor_thickness = require_f64(obj, "sensor_thickness")?;
        cfg.software_version = require_str(obj, "software_version")?.to_owned();
        cfg.wavelength = require_f64(obj, "wavelength")?;
        cfg.x_pixel_size = require_f64(obj, "x_pixel_size")?;
        cfg.x_pixels_in_detector = require_i64(obj, "x_pixels_in_detector")?;
        cfg.y_pixel_size = require_f64(obj, "y_pixel_size")?;
        cfg.y_pixels_in_detector = require_i64(obj, "y_pixels_in_detector")?;

        Ok(cfg)
    }

    /// Uncompressed byte count of one image at these settings.
    pub fn image_bytes(&self) -> usize {
        (self.bit_depth_image / 8) as usize
            * self.x_pixels_in_detector as usize
            * self.y_pixels_in_detector as usize
    }

    /// Total images in the series across all triggers.
    pub fn total_images(&self) -> i64 {
        self.nimages * self.ntrigger
    }

    /// Serialize back to the canonical wire form. Used to build test
    /// fixtures; all fields must be populated (non-NaN) first.
    pub fn to_json(&self) -> String {
        json!({
            "beam_center_x": self.beam_center_x,
            "beam_center_y": self.beam_center_y,
            "bit_depth_image": self.bit_depth_image,
            "compression": self.compression.name(),
            "count_time": self.count_time,
            "countrate_correction_count_cutoff": self.countrate_correction_count_cutoff,
            "description": self.description,
            "detector_distance": self.detector_distance,
            "detector_number": self.detector_number,
            "frame_time": self.frame_time,
            "nimages": self.nimages,
            "ntrigger": self.ntrigger,
            "omega_start": self.omega_start,
            "omega_increment": self.omega_increment,
            "sensor_thickness": self.sensor_thickness,
            "software_version": self.software_version,
            "wavelength": self.wavelength,
            "x_pixel_size": self.x_pixel_size,
            "x_pixels_in_detector": self.x_pixels_in_detector,
            "y_pixel_size": self.y_pixel_size,
            "y_pixels_in_detector": self.y_pixels_in_detector,
        })
        .to_string()
    }
}

/// A fixed-width element of a [`Mask2D`].
pub trait MaskElement: Copy + Default {
    const SIZE: usize;
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

impl MaskElement for f32 {
    const SIZE: usize = 4;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        f32::from_le_bytes(buf)
    }
}

impl MaskElement for u32 {
    const SIZE: usize = 4;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        u32::from_le_bytes(buf)
    }
}

/// A dense width × height table, used for the flatfield, the pixel mask, and
/// the countrate table. Owned by the global-data parser; lifetime bounded by
/// the series.
#[derive(Debug, Default)]
pub struct Mask2D<T: MaskElement> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: MaskElement> Mask2D<T> {
    pub fn new() -> Self {
        Self { width: 0, height: 0, data: Vec::new() }
    }

    /// Allocate for the given shape, discarding previous contents.
    pub fn allocate(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.data = vec![T::default(); width * height];
    }

    /// Release the table and return to the unallocated state.
    pub fn clear(&mut self) {
        self.width = 0;
        self.height = 0;
        self.data = Vec::new();
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn element_size(&self) -> usize {
        T::SIZE
    }

    /// Total byte count of the allocated table.
    pub fn n_bytes(&self) -> usize {
        self.width * self.height * T::SIZE
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Copy an opaque little-endian blob into the table. The blob length
    /// must match the allocated shape exactly.
    pub fn fill_from_bytes(&mut self, what: &str, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.n_bytes() {
            return Err(StreamError::protocol(
                "global header",
                format!("expected {} size (bytes): {}, actual: {}", what, self.n_bytes(), bytes.len()),
            ));
        }
        for (dst, src) in self.data.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
            *dst = T::from_le_bytes(src);
        }
        Ok(())
    }
}
