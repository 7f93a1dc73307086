//! Sample rate conversion using rubato
//!
//! Loops are converted once, when they are loaded, to the rate of the output
//! that will play them. The mixer then steps through frames one for one.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use tracing::debug;

use super::decode::DecodedAudio;
use crate::error::{PlayerError, Result};

const CHANNELS: usize = 2;

/// Convert `audio` to `output_rate`
///
/// Audio already at `output_rate` is returned unchanged.
pub fn resample(audio: DecodedAudio, output_rate: u32) -> Result<DecodedAudio> {
    if audio.sample_rate == output_rate {
        return Ok(audio);
    }
    if output_rate == 0 || audio.sample_rate == 0 {
        return Err(PlayerError::Decode(format!(
            "Cannot resample {} Hz to {} Hz",
            audio.sample_rate, output_rate
        )));
    }
    if audio.is_empty() {
        return Err(PlayerError::Decode("Nothing to resample".into()));
    }

    let planar = deinterleave(&audio.samples);
    let input_frames = planar[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / audio.sample_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        CHANNELS,
    )
    .map_err(|e| PlayerError::Decode(format!("Failed to create resampler: {}", e)))?;

    let output = resampler
        .process(&planar, None)
        .map_err(|e| PlayerError::Decode(format!("Resampling failed: {}", e)))?;
    let samples = interleave(&output);

    debug!(
        from = audio.sample_rate,
        to = output_rate,
        input_frames,
        output_frames = samples.len() / CHANNELS,
        "Resampled soundscape"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: output_rate,
    })
}

/// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`
fn deinterleave(samples: &[f32]) -> Vec<Vec<f32>> {
    let frames = samples.len() / CHANNELS;
    let mut planar = vec![Vec::with_capacity(frames); CHANNELS];
    for frame in samples.chunks_exact(CHANNELS) {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for channel in planar {
            samples.push(channel[i]);
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(sample_rate: u32, frames: usize) -> DecodedAudio {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let s = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
            samples.push(s);
            samples.push(s);
        }
        DecodedAudio { samples, sample_rate }
    }

    #[test]
    fn test_deinterleave_and_interleave() {
        let planar = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(interleave(&planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_same_rate_unchanged() {
        let audio = sine(48_000, 100);
        assert_eq!(resample(audio.clone(), 48_000).unwrap(), audio);
    }

    #[test]
    fn test_frame_count_follows_ratio() {
        let resampled = resample(sine(44_100, 4_410), 48_000).unwrap();
        assert_eq!(resampled.sample_rate, 48_000);

        let frames = resampled.frames();
        assert!((4_790..=4_810).contains(&frames), "got {} frames", frames);
        assert!(resampled.samples.chunks(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(resample(sine(44_100, 10), 0), Err(PlayerError::Decode(_))));
    }
}
