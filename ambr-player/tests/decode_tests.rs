//! Decoding WAV soundscapes from memory

mod helpers;

use ambr_player::audio::decode_bytes;
use ambr_player::PlayerError;
use helpers::sine_wav;

#[test]
fn test_stereo_wav_decodes_all_frames() {
    let bytes = sine_wav(2, 44_100, 44_100);
    let audio = decode_bytes(&bytes, Some("wav")).unwrap();

    assert_eq!(audio.sample_rate, 44_100);
    assert_eq!(audio.frames(), 44_100);
    assert!((audio.duration().as_secs_f32() - 1.0).abs() < 0.001);
}

#[test]
fn test_mono_wav_becomes_stereo() {
    let bytes = sine_wav(1, 22_050, 2_205);
    let audio = decode_bytes(&bytes, Some("wav")).unwrap();

    assert_eq!(audio.sample_rate, 22_050);
    assert_eq!(audio.samples.len(), 2_205 * 2);
    for frame in audio.samples.chunks(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_samples_normalized() {
    let bytes = sine_wav(2, 48_000, 4_800);
    let audio = decode_bytes(&bytes, None).unwrap();

    let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.4 && peak <= 0.51, "peak {}", peak);
}

#[test]
fn test_truncated_header_rejected() {
    let bytes = sine_wav(2, 48_000, 480);
    let result = decode_bytes(&bytes[..20], Some("wav"));
    assert!(matches!(result, Err(PlayerError::Decode(_))));
}
