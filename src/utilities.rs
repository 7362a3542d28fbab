//! Internal utility functions.
//!
//! Pixel copying and timestamp conversion shared by the FFmpeg backend.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Bytes per pixel of the RGBA frames the backend scales into.
const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Copy pixel data from a scaled RGBA frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 4), which
/// [`image::RgbaImage::from_raw`] does not accept.
pub(crate) fn frame_to_rgba_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = width as usize * RGBA_BYTES_PER_PIXEL;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * height as usize);
        for row in 0..height as usize {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}

/// Convert seconds to a timestamp in `time_base`.
pub(crate) fn seconds_to_stream_timestamp(seconds: f64, time_base: Rational) -> i64 {
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    (seconds * denominator / numerator) as i64
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Start time of a stream in seconds, treating an unset start
/// (`AV_NOPTS_VALUE`) as zero.
pub(crate) fn stream_start_seconds(start_time: i64, time_base: Rational) -> f64 {
    if start_time == i64::MIN {
        0.0
    } else {
        pts_to_seconds(start_time, time_base)
    }
}

/// Display time of one frame at `frame_rate`, or `None` if the rate is unknown.
pub(crate) fn frame_interval(frame_rate: Rational) -> Option<f64> {
    if frame_rate.numerator() > 0 && frame_rate.denominator() > 0 {
        Some(frame_rate.denominator() as f64 / frame_rate.numerator() as f64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_seconds_and_stream_time() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(seconds_to_stream_timestamp(2.0, time_base), 180_000);
        assert!((pts_to_seconds(45_000, time_base) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn stream_start_is_zero_when_unset() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(stream_start_seconds(i64::MIN, time_base), 0.0);
        assert!((stream_start_seconds(126_000, time_base) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn frame_interval_needs_a_rate() {
        assert_eq!(frame_interval(Rational::new(25, 1)), Some(0.04));
        assert_eq!(frame_interval(Rational::new(0, 1)), None);
    }
}
