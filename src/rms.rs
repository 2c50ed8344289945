/// Root mean square of a window of i16 samples, 0 for an empty slice.
pub fn calculate_rms(chunk: &[i16]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    // f64 accumulation, i16::MIN squared overflows i32 sums quickly
    let sum_of_squares: f64 = chunk.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_of_squares / chunk.len() as f64).sqrt() as f32
}

/// RMS as a fraction of `full_scale`, clamped to [0, 1].
pub fn rms_level(chunk: &[i16], full_scale: f32) -> f32 {
    if full_scale <= 0.0 {
        return 0.0;
    }
    (calculate_rms(chunk) / full_scale).clamp(0.0, 1.0)
}
