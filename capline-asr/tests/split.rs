//! ffmpeg-backed transcode and split tests.

use capline_asr::audio::{AudioFormat, Ffmpeg, to_compact_audio};
use capline_asr::chunk::{ChunkConfig, split_if_oversized};
use eyre::Result;
use std::path::Path;

/// Write `secs` of a 440 Hz tone as 16 kHz mono 16-bit WAV.
fn write_tone(path: &Path, secs: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for n in 0..secs * spec.sample_rate {
        let t = n as f32 / spec.sample_rate as f32;
        let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 0.3;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn transcodes_wav_to_compact_mp3() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("tone.wav");
    write_tone(&input, 5)?;

    let audio = to_compact_audio(&Ffmpeg::default(), &input, AudioFormat::Mp3).await;

    assert!(audio.transcoded);
    assert_eq!(audio.path.extension().unwrap(), "mp3");
    assert!(std::fs::metadata(&audio.path)?.len() < std::fs::metadata(&input)?.len());
    Ok(())
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn splits_oversized_audio_into_fixed_chunks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("tone.wav");
    write_tone(&input, 25)?;

    // any file over 1 KiB is split into 10 s chunks
    let config = ChunkConfig::new(1024, 10.0);
    let chunks = split_if_oversized(&Ffmpeg::default(), &input, &config, &dir.path().join("chunks")).await?;

    assert!(chunks.split);
    assert_eq!(chunks.len(), config.expected_chunks(25.0));
    assert!(chunks.paths.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn unreadable_input_falls_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("garbage.mp4");
    std::fs::write(&input, b"not media at all")?;

    let audio = to_compact_audio(&Ffmpeg::default(), &input, AudioFormat::Mp3).await;

    assert!(!audio.transcoded);
    assert_eq!(audio.path, input);
    // failed output is not left behind
    assert!(!dir.path().join("garbage.compact.mp3").exists());
    Ok(())
}
