//! Soundscape decoding with symphonia
//!
//! Assets arrive as whole files in memory and are decoded up front into
//! interleaved stereo f32 (`[L, R, L, R, ...]`) at their native rate.
//! Mono is duplicated to both channels; more than two channels are folded
//! down by averaging the left-side and right-side channel groups.

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{PlayerError, Result};

/// A fully decoded soundscape loop
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a complete audio file
///
/// `extension` is a format hint (`"wav"`, `"mp3"`); probing still works
/// without it.
pub fn decode_bytes(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(PlayerError::Decode("Asset is empty".into()));
    }

    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlayerError::Decode(format!("Unrecognized format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| PlayerError::Decode("No audio track found".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| PlayerError::Decode("Track has no sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlayerError::Decode(format!("Unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(PlayerError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(PlayerError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels)
        {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        append_stereo(&mut samples, buf.samples(), channels);
    }

    if samples.is_empty() {
        return Err(PlayerError::Decode("Asset decoded to no audio".into()));
    }

    Ok(DecodedAudio { samples, sample_rate })
}

/// Append interleaved frames of `channels` channels as stereo
fn append_stereo(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            out.reserve(interleaved.len() * 2);
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(interleaved),
        n => {
            let left_count = n.div_ceil(2);
            let right_count = n - left_count;
            for frame in interleaved.chunks_exact(n) {
                let left: f32 = frame[..left_count].iter().sum::<f32>() / left_count as f32;
                let right: f32 = frame[left_count..].iter().sum::<f32>() / right_count as f32;
                out.push(left);
                out.push(right);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_duplicated() {
        let mut out = Vec::new();
        append_stereo(&mut out, &[0.1, 0.2], 1);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_multichannel_folded() {
        let mut out = Vec::new();
        append_stereo(&mut out, &[1.0, 0.0, 0.5, 0.5], 4);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(matches!(decode_bytes(&[], None), Err(PlayerError::Decode(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        let result = decode_bytes(b"definitely not audio", Some("wav"));
        assert!(matches!(result, Err(PlayerError::Decode(_))));
    }

    #[test]
    fn test_duration() {
        let audio = DecodedAudio {
            samples: vec![0.0; 2 * 48_000],
            sample_rate: 48_000,
        };
        assert_eq!(audio.duration(), Duration::from_secs(1));
    }
}
