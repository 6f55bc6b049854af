//! Internal utility functions.
//!
//! Helpers for pixel-plane copying and timestamp conversion shared by the
//! FFmpeg backend and the timestamp deriver.

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy one plane of an FFmpeg frame into a tightly packed buffer.
///
/// FFmpeg rows are frequently padded (`stride > width * bytes_per_pixel`);
/// the padding is dropped so the result reshapes directly to `(H, W, C)`.
#[cfg(feature = "ffmpeg")]
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = width * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * height].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * height);
        for row in 0..height {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Rescale a PTS value from stream time base to seconds.
#[cfg(feature = "ffmpeg")]
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator().max(1) as f64
}

/// Convert a PTS value to a container seek target in `AV_TIME_BASE`
/// (microseconds).
#[cfg(feature = "ffmpeg")]
pub(crate) fn pts_to_seek_timestamp(pts: i64, time_base: Rational) -> i64 {
    (pts_to_seconds(pts, time_base) * 1_000_000.0).floor() as i64
}

/// The first `(numerator, denominator)` rate that is finite and positive.
#[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
pub(crate) fn usable_frame_rate(candidates: &[(i32, i32)]) -> Option<f64> {
    candidates
        .iter()
        .filter(|(numerator, denominator)| *numerator > 0 && *denominator > 0)
        .map(|&(numerator, denominator)| f64::from(numerator) / f64::from(denominator))
        .find(|rate| rate.is_finite() && *rate > 0.0)
}

/// Display-order index of the frame presented at `pts`.
///
/// `table` holds every frame's PTS in ascending order. When several frames
/// share `pts`, the one at `wanted` is chosen if it is among them. A PTS that
/// is not in the table maps to its nearest entry.
#[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
pub(crate) fn frame_rank(table: &[i64], pts: i64, wanted: u64) -> u64 {
    let lower = table.partition_point(|&value| value < pts);
    let upper = table.partition_point(|&value| value <= pts);
    if lower < upper {
        return (wanted as usize).clamp(lower, upper - 1) as u64;
    }
    match (lower.checked_sub(1), table.get(lower)) {
        (Some(before), Some(&after)) if after - pts < pts - table[before] => lower as u64,
        (Some(before), _) => before as u64,
        (None, _) => 0,
    }
}

/// Round `value` to `decimals` decimal places.
pub(crate) fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::{frame_rank, round_to_decimals, usable_frame_rate};

    #[test]
    fn rounding_hides_float_noise() {
        let noisy = 0.1 + 0.2;
        assert_ne!(noisy, 0.3);
        assert_eq!(round_to_decimals(noisy, 9), round_to_decimals(0.3, 9));
    }

    #[test]
    fn rounding_keeps_real_differences() {
        assert_ne!(round_to_decimals(0.040, 9), round_to_decimals(0.045, 9));
    }

    #[test]
    fn variable_rate_frames_map_to_their_display_index() {
        // 0.00, 0.04, 0.10, 0.12 s in a 1/100 time base: a 25 fps guess would
        // put the last two frames both at index 3.
        let table = [0, 4, 10, 12];
        let ranks: Vec<u64> = table
            .iter()
            .enumerate()
            .map(|(index, &pts)| frame_rank(&table, pts, index as u64))
            .collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn unlisted_pts_maps_to_nearest_frame() {
        let table = [0, 4, 10, 12];
        assert_eq!(frame_rank(&table, 5, 0), 1);
        assert_eq!(frame_rank(&table, 9, 0), 2);
        assert_eq!(frame_rank(&table, 40, 0), 3);
        assert_eq!(frame_rank(&table, -3, 2), 0);
    }

    #[test]
    fn shared_pts_prefers_wanted_frame() {
        let table = [0, 4, 4, 8];
        assert_eq!(frame_rank(&table, 4, 2), 2);
        assert_eq!(frame_rank(&table, 4, 1), 1);
        assert_eq!(frame_rank(&table, 4, 0), 1);
        assert_eq!(frame_rank(&table, 4, 3), 2);
    }

    #[test]
    fn unusable_frame_rates_are_skipped() {
        assert_eq!(usable_frame_rate(&[(0, 1), (25, 1)]), Some(25.0));
        assert_eq!(usable_frame_rate(&[(30000, 1001)]), Some(30000.0 / 1001.0));
        assert_eq!(usable_frame_rate(&[(0, 0), (-1, 1), (25, 0)]), None);
        assert_eq!(usable_frame_rate(&[]), None);
    }
}
