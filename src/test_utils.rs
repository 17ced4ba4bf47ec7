//! Shared fixtures for unit tests: a small but fully-populated detector
//! configuration and builders for every wire message part.
//!
//! The detector here is deliberately tiny (96 × 64 pixels) so codec and
//! state-machine tests stay fast; the field values otherwise mirror a real
//! acquisition setup.

#![cfg(test)]

use serde_json::json;

use crate::codec::Compression;
use crate::detector::{DetectorConfig, HeaderDetail};

/// A populated configuration for a small test detector.
pub fn sample_config(compression: Compression) -> DetectorConfig {
    DetectorConfig {
        beam_center_x: 2110.0,
        beam_center_y: 2200.0,
        bit_depth_image: 32,
        compression,
        count_time: 0.2,
        countrate_correction_count_cutoff: 765063,
        description: "MATTERHORN 2X 65536M".to_owned(),
        detector_distance: 125.0,
        detector_number: "M-32-0128".to_owned(),
        frame_time: 0.2,
        nimages: 1,
        ntrigger: 1,
        omega_start: 0.0,
        omega_increment: 90.0,
        sensor_thickness: 4.5e-4,
        software_version: "1.8.0".to_owned(),
        wavelength: 1.670046,
        x_pixel_size: 7.5e-5,
        x_pixels_in_detector: 96,
        y_pixel_size: 7.5e-5,
        y_pixels_in_detector: 64,
    }
}

/// Global header part 1.
pub fn header_part1(series: i64, detail: HeaderDetail) -> Vec<u8> {
    json!({
        "htype": "dheader-1.0",
        "series": series,
        "header_detail": detail.name(),
    })
    .to_string()
    .into_bytes()
}

/// Global header parts 3, 5, and 7: the mask descriptors.
pub fn mask_descriptor(htype: &str, width: i64, height: i64, dtype: &str) -> Vec<u8> {
    json!({
        "htype": htype,
        "shape": [width, height],
        "type": dtype,
    })
    .to_string()
    .into_bytes()
}

/// Frame part 1.
pub fn frame_part1(series: i64, frame: i64) -> Vec<u8> {
    json!({
        "htype": "dimage-1.0",
        "series": series,
        "frame": frame,
        "hash": "fc67f000d08fe6b380ea9434b8362d22",
    })
    .to_string()
    .into_bytes()
}

/// Frame part 2: the image descriptor.
pub fn frame_part2(cfg: &DetectorConfig, compressed_size: usize) -> Vec<u8> {
    json!({
        "htype": "dimage_d-1.0",
        "shape": [cfg.x_pixels_in_detector, cfg.y_pixels_in_detector],
        "type": format!("uint{}", cfg.bit_depth_image),
        "encoding": cfg.compression.name(),
        "size": compressed_size,
    })
    .to_string()
    .into_bytes()
}

/// Frame part 4: the timing record.
pub fn frame_part4(cfg: &DetectorConfig, frame: i64) -> Vec<u8> {
    let real_time = (cfg.frame_time * 1.0e9) as i64;
    json!({
        "htype": "dconfig-1.0",
        "start_time": real_time * (frame - 1),
        "stop_time": real_time * frame,
        "real_time": real_time,
    })
    .to_string()
    .into_bytes()
}

/// End-of-series marker.
pub fn series_end(series: i64) -> Vec<u8> {
    json!({
        "htype": "dseries_end-1.0",
        "series": series,
    })
    .to_string()
    .into_bytes()
}
