//! Deterministic signals shared by the aligner tests

use syncwarp_analysis::Frame;

/// Uniform noise in [-1, 1) from a linear congruential generator
pub(crate) fn noise(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
        })
        .collect()
}

/// Same length as `samples`, starting with `secs` of silence at 44.1kHz
pub(crate) fn delayed(samples: &[f32], secs: f64) -> Vec<f32> {
    let lead = ((secs * 44100.0).round() as usize).min(samples.len());
    let mut out = vec![0.0; lead];
    out.extend_from_slice(&samples[..samples.len() - lead]);
    out
}

/// Random non-negative frames normalized to sum to one
pub(crate) fn synthetic_frames(count: usize, seed: u32) -> Vec<Frame> {
    let values = noise(count * 84, seed);
    values
        .chunks(84)
        .map(|chunk| {
            let positive: Vec<f32> = chunk.iter().map(|v| v.abs() + 0.01).collect();
            let total: f32 = positive.iter().sum();
            Frame::new(positive.into_iter().map(|v| v / total).collect())
        })
        .collect()
}
