//! Global-header parsing for an image series.
//!
//! Each series opens with a *global header*: between two and eight message
//! parts, optionally followed by an appendix. [`GlobalData`] is a nested
//! state machine that a frame sink delegates to until the header is
//! complete, then holds the series-scoped data (detector configuration,
//! flatfield, pixel mask, countrate table) read-only for the rest of the
//! series.
//!
//! Part sequence by header detail level:
//!
//! | detail  | parts                                                        |
//! |---------|--------------------------------------------------------------|
//! | `basic` | 1 (`dheader-1.0`), 2 (detector config)                       |
//! | `all`   | basic + 3/4 (flatfield), 5/6 (pixel mask), 7/8 (countrate)   |
//!
//! The appendix part is present iff the DCU is configured for it; that flag
//! comes from our own configuration, not the wire, and survives `reset()`.
//!
//! This path runs once per series, so it favors clarity over throughput:
//! the `htype` of part 1 is checked in every build, later descriptors only
//! in debug builds.

use serde_json::Value;
use tracing::{debug, trace};

use crate::detector::{DetectorConfig, HeaderDetail, Mask2D};
use crate::error::{Result, StreamError};
use crate::json::{expect_htype, parse_object, require_i64, require_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobalState {
    Part1,
    Part2,
    Part3,
    Part4,
    Part5,
    Part6,
    Part7,
    Part8,
    Appendix,
    Done,
}

/// Per-series global data and the state machine that populates it.
#[derive(Debug)]
pub struct GlobalData {
    state: GlobalState,
    using_header_appendix: bool,

    series_id: i64,
    header_detail: HeaderDetail,
    config: DetectorConfig,
    flatfield: Mask2D<f32>,
    pixel_mask: Mask2D<u32>,
    countrate_table: Mask2D<f32>,
    header_appendix: Option<String>,
}

impl Default for GlobalData {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalData {
    pub fn new() -> Self {
        Self {
            state: GlobalState::Part1,
            using_header_appendix: false,
            series_id: -1,
            header_detail: HeaderDetail::Unknown,
            config: DetectorConfig::default(),
            flatfield: Mask2D::new(),
            pixel_mask: Mask2D::new(),
            countrate_table: Mask2D::new(),
            header_appendix: None,
        }
    }

    /// Expect an appendix part at the end of every global header. Set from
    /// configuration before the first series; not cleared by [`reset`](Self::reset).
    pub fn enable_header_appendix(&mut self) {
        self.using_header_appendix = true;
    }

    pub fn using_header_appendix(&self) -> bool {
        self.using_header_appendix
    }

    pub fn series_id(&self) -> i64 {
        self.series_id
    }

    pub fn header_detail(&self) -> HeaderDetail {
        self.header_detail
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn flatfield(&self) -> &Mask2D<f32> {
        &self.flatfield
    }

    pub fn pixel_mask(&self) -> &Mask2D<u32> {
        &self.pixel_mask
    }

    pub fn countrate_table(&self) -> &Mask2D<f32> {
        &self.countrate_table
    }

    pub fn header_appendix(&self) -> Option<&str> {
        self.header_appendix.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == GlobalState::Done
    }

    /// Consume one message part. Returns `true` once the whole global header
    /// for the current series has been parsed; the caller then owns the data
    /// through its accessors and must [`reset`](Self::reset) before the next
    /// series.
    pub fn parse(&mut self, data: &[u8]) -> Result<bool> {
        match self.state {
            GlobalState::Part1 => {
                self.parse_part1(data)?;
                match self.header_detail {
                    HeaderDetail::Basic | HeaderDetail::All => self.state = GlobalState::Part2,
                    HeaderDetail::None => {
                        return Err(StreamError::protocol(
                            "global header",
                            "incompatible DCU configuration: header_detail is \"none\", cannot \
                             obtain the metadata needed to process image frames; set \
                             header_detail to \"basic\" or \"all\"",
                        ));
                    }
                    HeaderDetail::Unknown => unreachable!("part 1 parser rejects unknown detail"),
                }
            }
            GlobalState::Part2 => {
                self.parse_part2(data)?;
                self.state = match self.header_detail {
                    HeaderDetail::Basic => self.appendix_or_done(),
                    HeaderDetail::All => GlobalState::Part3,
                    _ => unreachable!("header detail fixed by part 1"),
                };
            }
            GlobalState::Part3 => {
                let (w, h) = parse_mask_descriptor(data, "dflatfield-1.0", "flatfield")?;
                self.flatfield.allocate(w, h);
                self.state = GlobalState::Part4;
            }
            GlobalState::Part4 => {
                self.flatfield.fill_from_bytes("flatfield", data)?;
                self.state = GlobalState::Part5;
            }
            GlobalState::Part5 => {
                let (w, h) = parse_mask_descriptor(data, "dpixelmask-1.0", "pixel mask")?;
                self.pixel_mask.allocate(w, h);
                self.state = GlobalState::Part6;
            }
            GlobalState::Part6 => {
                self.pixel_mask.fill_from_bytes("pixel mask", data)?;
                self.state = GlobalState::Part7;
            }
            GlobalState::Part7 => {
                let (w, h) = parse_mask_descriptor(data, "dcountrate_table-1.0", "countrate table")?;
                self.countrate_table.allocate(w, h);
                self.state = GlobalState::Part8;
            }
            GlobalState::Part8 => {
                self.countrate_table.fill_from_bytes("countrate table", data)?;
                self.state = self.appendix_or_done();
            }
            GlobalState::Appendix => {
                self.header_appendix = Some(String::from_utf8_lossy(data).into_owned());
                trace!(appendix = ?self.header_appendix, "captured header appendix");
                self.state = GlobalState::Done;
            }
            GlobalState::Done => {
                return Err(StreamError::protocol(
                    "global header",
                    "header already complete; reset() is required before a new series",
                ));
            }
        }
        Ok(self.state == GlobalState::Done)
    }

    /// Return to the initial state, releasing all series-scoped data. The
    /// header-appendix flag is configuration, not wire state, and persists.
    pub fn reset(&mut self) {
        self.state = GlobalState::Part1;
        self.series_id = -1;
        self.header_detail = HeaderDetail::Unknown;
        self.config = DetectorConfig::default();
        self.flatfield.clear();
        self.pixel_mask.clear();
        self.countrate_table.clear();
        self.header_appendix = None;
    }

    fn appendix_or_done(&self) -> GlobalState {
        if self.using_header_appendix {
            GlobalState::Appendix
        } else {
            GlobalState::Done
        }
    }

    fn parse_part1(&mut self, data: &[u8]) -> Result<()> {
        let obj = parse_object(data)?;
        // Unconditional htype check on part 1: this is the one message that
        // anchors a whole series to its metadata.
        expect_htype(&obj, "dheader-1.0")?;

        self.series_id = require_i64(&obj, "series")?;

        let detail = require_str(&obj, "header_detail")?;
        self.header_detail = HeaderDetail::from_name(detail);
        if self.header_detail == HeaderDetail::Unknown {
            return Err(StreamError::protocol(
                "global header",
                format!("unrecognized value for header_detail: \"{}\"", detail),
            ));
        }

        debug!(series = self.series_id, detail = %self.header_detail, "new image series");
        Ok(())
    }

    fn parse_part2(&mut self, data: &[u8]) -> Result<()> {
        let obj = parse_object(data)?;
        self.config = DetectorConfig::from_json(&obj)?;
        debug!(
            series = self.series_id,
            compression = %self.config.compression,
            nimages = self.config.nimages,
            ntrigger = self.config.ntrigger,
            "parsed detector configuration"
        );
        Ok(())
    }
}

/// Parts 3, 5, and 7 share a shape-descriptor layout. Returns the shape the
/// following blob must fill.
fn parse_mask_descriptor(data: &[u8], htype: &str, what: &str) -> Result<(usize, usize)> {
    let obj = parse_object(data)?;
    if cfg!(debug_assertions) {
        expect_htype(&obj, htype)?;
    }
    parse_shape(&obj, what)
}

/// Read a two-element `shape` array; a missing or non-integer dimension is
/// fatal.
fn parse_shape(obj: &Value, what: &str) -> Result<(usize, usize)> {
    let shape = obj
        .get("shape")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            StreamError::protocol("global header", format!("missing shape array for the {}", what))
        })?;

    let width = shape.first().and_then(Value::as_i64).ok_or_else(|| {
        StreamError::protocol("global header", format!("invalid width for the {}", what))
    })?;
    let height = shape.get(1).and_then(Value::as_i64).ok_or_else(|| {
        StreamError::protocol("global header", format!("invalid height for the {}", what))
    })?;

    Ok((width as usize, height as usize))
}
