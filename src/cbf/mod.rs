//! Conversion of stream series to minicbf files, one image per file.
//!
//! [`CbfSink`] implements [`FrameSink`] with a per-frame state machine
//! layered over the [`GlobalData`] header parser:
//!
//! ```text
//! global_header ──(header complete)──▶ new_frame
//!    new_frame ──dimage-1.0──▶ part2 ──▶ part3 ──▶ part4 ─┬─▶ new_frame
//!         │                                               └▶ appendix ─▶ new_frame
//!         └────dseries_end-1.0──▶ (flush done, back to global_header)
//! ```
//!
//! Each completed frame is committed as `"<series>-<frame>.cbf"` in the
//! sink's output directory: a single datablock holding the SLS-convention
//! textual header and the image as a byte-offset-compressed integer array.
//!
//! The sink does not post-process frames (no pixel-mask application, no
//! flat-field correction); any such correction must be applied by the DCU.

pub mod byte_offset;

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, trace};

use crate::buffer::FrameBuffer;
use crate::detector::DetectorConfig;
use crate::error::{Result, StreamError};
use crate::global::GlobalData;
use crate::json::{expect_htype, optional_i64, parse_object, pointer_bool, require_i64, require_str};
use crate::sink::FrameSink;

/// Marks the start of binary data inside a CIF binary section.
const BINARY_MAGIC: [u8; 4] = [0x0C, 0x1A, 0x04, 0xD5];

const SECTION_OPEN: &str = "--CIF-BINARY-FORMAT-SECTION--";
const SECTION_CLOSE: &str = "--CIF-BINARY-FORMAT-SECTION----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    GlobalHeader,
    NewFrame,
    MidframePart2,
    MidframePart3,
    MidframePart4,
    MidframeAppendix,
}

/// A [`FrameSink`] that writes one minicbf file per image frame.
#[derive(Debug)]
pub struct CbfSink {
    state: FrameState,
    global: GlobalData,
    image: FrameBuffer,
    frame_id: i64,
    header_contents: String,
    image_appendix: Option<String>,
    using_image_appendix: bool,
    output_dir: PathBuf,
}

impl Default for CbfSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CbfSink {
    /// A sink with no appendices expected, writing to the working directory.
    pub fn new() -> Self {
        Self {
            state: FrameState::GlobalHeader,
            global: GlobalData::new(),
            image: FrameBuffer::empty(),
            frame_id: -1,
            header_contents: String::new(),
            image_appendix: None,
            using_image_appendix: false,
            output_dir: PathBuf::from("."),
        }
    }

    /// Configure appendix expectations from the loaded config file
    /// (`/archiver/source/using_header_appendix` and
    /// `/archiver/source/using_image_appendix`, both defaulting to false).
    pub fn from_config(config: &Value) -> Self {
        let mut sink = Self::new();
        if pointer_bool(config, "/archiver/source/using_header_appendix").unwrap_or(false) {
            sink.global.enable_header_appendix();
        }
        sink.using_image_appendix =
            pointer_bool(config, "/archiver/source/using_image_appendix").unwrap_or(false);
        sink
    }

    /// Explicit appendix flags, mainly for tests.
    pub fn with_appendices(header_appendix: bool, image_appendix: bool) -> Self {
        let mut sink = Self::new();
        if header_appendix {
            sink.global.enable_header_appendix();
        }
        sink.using_image_appendix = image_appendix;
        sink
    }

    /// Directory output files land in. Defaults to the process working
    /// directory; a general-purpose directory layout is still an open
    /// question for the deployment side.
    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = dir.into();
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Series-scoped data parsed from the current global header.
    pub fn global(&self) -> &GlobalData {
        &self.global
    }

    /// Handle a `new_frame` part: either frame part 1 or end-of-series.
    /// Returns `true` for end-of-series.
    fn parse_part1_or_series_end(&mut self, data: &[u8]) -> Result<bool> {
        let obj = parse_object(data)?;
        let htype = require_str(&obj, "htype")?;

        if htype == "dseries_end-1.0" {
            let series = require_i64(&obj, "series")?;
            if series != self.global.series_id() {
                return Err(StreamError::SeriesMismatch {
                    expected: self.global.series_id(),
                    received: series,
                });
            }
            info!(series, "series end record received");
            return Ok(true);
        }

        if htype != "dimage-1.0" {
            return Err(StreamError::protocol(
                "frame",
                format!(
                    "expected a \"dimage-1.0\" (frame part 1) or \"dseries_end-1.0\" \
                     (end of series) message, received \"{}\"",
                    htype
                ),
            ));
        }

        // Without a matching series id there is no way to recover the right
        // metadata for this image; the minicbf would be useless.
        let series = require_i64(&obj, "series")?;
        if series != self.global.series_id() {
            return Err(StreamError::SeriesMismatch {
                expected: self.global.series_id(),
                received: series,
            });
        }
        self.frame_id = require_i64(&obj, "frame")?;
        // The "hash" field is an MD5 the sink currently ignores.
        Ok(false)
    }

    /// Render the complete minicbf byte stream for the current frame.
    fn render_minicbf(&self) -> Vec<u8> {
        let config = self.global.config();
        let series = self.global.series_id();
        let x = config.x_pixels_in_detector;
        let y = config.y_pixels_in_detector;

        let pixels: Vec<i32> = self
            .image
            .as_slice()
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let payload = byte_offset::encode(&pixels);

        let mut out = Vec::with_capacity(payload.len() + 1024);
        out.extend_from_slice(b"###CBF: VERSION 1.5\n");
        out.extend_from_slice(b"# CBF file written by cbfstreamd\n\n");
        out.extend_from_slice(format!("data_{}_{}\n\n", series, self.frame_id).as_bytes());

        out.extend_from_slice(b"loop_\n_array_data.header_convention\n\"SLS_1.0\"\n");
        out.extend_from_slice(b"_array_data.header_contents\n;");
        out.extend_from_slice(self.header_contents.as_bytes());
        out.extend_from_slice(b";\n\n");

        out.extend_from_slice(b"loop_\n_array_data.data\n;\n");
        out.extend_from_slice(
            format!(
                "{}\n\
                 Content-Type: application/octet-stream;\n\
                 \x20    conversion=\"x-CBF_BYTE_OFFSET\"\n\
                 Content-Transfer-Encoding: BINARY\n\
                 X-Binary-Size: {}\n\
                 X-Binary-ID: 1\n\
                 X-Binary-Element-Type: \"signed 32-bit integer\"\n\
                 X-Binary-Element-Byte-Order: LITTLE_ENDIAN\n\
                 X-Binary-Number-of-Elements: {}\n\
                 X-Binary-Size-Fastest-Dimension: {}\n\
                 X-Binary-Size-Second-Dimension: {}\n\
                 X-Binary-Size-Padding: 0\n\n",
                SECTION_OPEN,
                payload.len(),
                x * y,
                x,
                y,
            )
            .as_bytes(),
        );
        out.extend_from_slice(&BINARY_MAGIC);
        out.extend_from_slice(&payload);
        out.extend_from_slice(format!("\n{}\n;\n", SECTION_CLOSE).as_bytes());
        out
    }
}

impl FrameSink for CbfSink {
    fn parse(&mut self, data: &[u8]) -> Result<bool> {
        let mut series_finished = false;

        match self.state {
            FrameState::GlobalHeader => {
                if self.global.parse(data)? {
                    // Size the decode target once; it never changes within
                    // a series.
                    self.image.resize(self.global.config().image_bytes());
                    self.state = FrameState::NewFrame;
                    debug!(
                        series = self.global.series_id(),
                        image_bytes = self.image.len(),
                        "global header complete"
                    );
                }
            }

            FrameState::NewFrame => {
                if self.parse_part1_or_series_end(data)? {
                    series_finished = true;
                    self.reset();
                } else {
                    self.header_contents =
                        build_header_contents(self.global.config(), self.frame_id);
                    self.state = FrameState::MidframePart2;
                }
            }

            FrameState::MidframePart2 => {
                // The shape and size here are redundant with the detector
                // configuration; nothing to record.
                if cfg!(debug_assertions) {
                    let obj = parse_object(data)?;
                    expect_htype(&obj, "dimage_d-1.0")?;
                }
                self.state = FrameState::MidframePart3;
            }

            FrameState::MidframePart3 => {
                let config = self.global.config();
                let element_size = (config.bit_depth_image / 8) as usize;
                let codec = config.compression;
                self.image.decode(codec, data, element_size)?;
                self.state = FrameState::MidframePart4;
            }

            FrameState::MidframePart4 => {
                // Measured exposure times; the configured times in the
                // global header are what the output records.
                if cfg!(debug_assertions) {
                    let obj = parse_object(data)?;
                    expect_htype(&obj, "dconfig-1.0")?;
                    trace!(
                        start_time = optional_i64(&obj, "start_time"),
                        stop_time = optional_i64(&obj, "stop_time"),
                        real_time = optional_i64(&obj, "real_time"),
                        "frame timing record"
                    );
                }
                if self.using_image_appendix {
                    self.state = FrameState::MidframeAppendix;
                } else {
                    self.flush()?;
                    self.state = FrameState::NewFrame;
                }
            }

            FrameState::MidframeAppendix => {
                self.image_appendix = Some(String::from_utf8_lossy(data).into_owned());
                trace!(appendix = ?self.image_appendix, "captured image appendix");
                self.flush()?;
                self.state = FrameState::NewFrame;
            }
        }

        Ok(series_finished)
    }

    fn flush(&mut self) -> Result<()> {
        let path = self
            .output_dir
            .join(format!("{}-{}.cbf", self.global.series_id(), self.frame_id));

        let contents = self.render_minicbf();
        std::fs::write(&path, &contents).map_err(|e| StreamError::sink(&path, e))?;

        debug!(path = %path.display(), bytes = contents.len(), "committed frame");
        self.image_appendix = None;
        Ok(())
    }

    fn reset(&mut self) {
        self.state = FrameState::GlobalHeader;
        self.global.reset();
        self.image.reset();
        self.frame_id = -1;
        self.header_contents.clear();
        self.image_appendix = None;
    }
}

/// Render the SLS-convention header block for one frame. The per-frame
/// rotation angle advances by `omega_increment` from `omega_start`.
fn build_header_contents(config: &DetectorConfig, frame_id: i64) -> String {
    let start_angle = config.omega_start + (frame_id - 1) as f64 * config.omega_increment;
    format!(
        "\n\
         # Detector: {}, S/N {}\n\
         # Pixel_size {}e-6 m x {}e-6 m\n\
         # Silicon sensor, thickness {:.6} m\n\
         # Exposure_time {:.6} s\n\
         # Exposure_period {:.6} s\n\
         # Count_cutoff {} counts\n\
         # Wavelength {:.6} A\n\
         # Detector_distance {:.6} m\n\
         # Beam_xy ({}, {}) pixels\n\
         # Start_angle {:.6} deg.\n\
         # Angle_increment {:.6} deg.\n",
        config.description,
        config.detector_number,
        (config.x_pixel_size * 1e6) as i64,
        (config.y_pixel_size * 1e6) as i64,
        config.sensor_thickness,
        config.count_time,
        config.frame_time,
        config.countrate_correction_count_cutoff,
        config.wavelength,
        config.detector_distance,
        config.beam_center_x as i64,
        config.beam_center_y as i64,
        start_angle,
        config.omega_increment,
    )
}
