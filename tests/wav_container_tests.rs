// Integration tests for WAV container output
//
// These tests check the canonical 44-byte header, the size fields derived
// from the payload, and that output is reproducible byte for byte.

use anyhow::Result;
use voxlink::audio::{AudioChunk, WavContainerWriter, WavFormat, WAV_HEADER_LEN};

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

/// `count` chunks of `frames` frames each, with distinct sample values
fn chunks(count: usize, frames: usize, channels: u16, sample_rate: u32) -> Vec<AudioChunk> {
    (0..count)
        .map(|c| {
            let samples: Vec<i16> = (0..frames * channels as usize)
                .map(|i| ((c * 1000 + i) % 30000) as i16 - 15000)
                .collect();
            AudioChunk::new(c as u64, &samples, sample_rate, channels, c as u64 * 100)
        })
        .collect()
}

#[test]
fn test_header_sizes_follow_payload() -> Result<()> {
    for &(count, frames, channels, rate) in &[
        (1usize, 1600usize, 2u16, 16000u32),
        (7, 1600, 2, 16000),
        (3, 441, 1, 44100),
        (12, 80, 1, 8000),
        (5, 960, 2, 48000),
    ] {
        let input = chunks(count, frames, channels, rate);
        let writer = WavContainerWriter::new(WavFormat::new(channels, rate));
        let bytes = writer.encode_chunks(&input)?;

        let data_bytes = (count * frames * channels as usize * 2) as u32;
        assert_eq!(bytes.len(), WAV_HEADER_LEN + data_bytes as usize);

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 36 + data_bytes, "RIFF size");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16, "fmt chunk size");
        assert_eq!(u16_at(&bytes, 20), 1, "PCM format tag");
        assert_eq!(u16_at(&bytes, 22), channels);
        assert_eq!(u32_at(&bytes, 24), rate);
        assert_eq!(u32_at(&bytes, 28), rate * channels as u32 * 2, "byte rate");
        assert_eq!(u16_at(&bytes, 32), channels * 2, "block align");
        assert_eq!(u16_at(&bytes, 34), 16, "bits per sample");
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), data_bytes, "data size");
    }

    Ok(())
}

#[test]
fn test_output_is_reproducible() -> Result<()> {
    let input = chunks(4, 1600, 2, 16000);
    let writer = WavContainerWriter::new(WavFormat::new(2, 16000));

    let first = writer.encode_chunks(&input)?;
    let second = writer.encode_chunks(&input)?;
    let third = WavContainerWriter::new(WavFormat::new(2, 16000)).encode_chunks(&input)?;

    assert_eq!(first, second);
    assert_eq!(first, third);
    Ok(())
}

#[test]
fn test_payload_is_concatenated_little_endian_samples() -> Result<()> {
    let a = AudioChunk::new(0, &[1, -1], 16000, 2, 0);
    let b = AudioChunk::new(1, &[256, i16::MIN], 16000, 2, 0);
    let bytes = WavContainerWriter::new(WavFormat::new(2, 16000)).encode_chunks(&[a, b])?;

    assert_eq!(
        &bytes[WAV_HEADER_LEN..],
        &[0x01, 0x00, 0xFF, 0xFF, 0x00, 0x01, 0x00, 0x80]
    );
    Ok(())
}

#[test]
fn test_empty_input_is_header_only() -> Result<()> {
    let bytes = WavContainerWriter::new(WavFormat::new(1, 16000)).encode_chunks(&[])?;

    assert_eq!(bytes.len(), WAV_HEADER_LEN);
    assert_eq!(u32_at(&bytes, 4), 36);
    assert_eq!(u32_at(&bytes, 40), 0);
    Ok(())
}

#[test]
fn test_write_file_round_trips_through_reader() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("session.wav");
    let input = chunks(3, 160, 2, 16000);

    let writer = WavContainerWriter::new(WavFormat::new(2, 16000));
    let summary = writer.write_file(&path, &input)?;
    assert_eq!(summary.sample_count, 3 * 160 * 2);
    assert_eq!(summary.data_bytes, 3 * 160 * 2 * 2);

    let reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 16000);
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    let expected: Vec<i16> = input.iter().flat_map(|c| c.samples.iter().copied()).collect();
    assert_eq!(samples, expected);

    // File on disk matches the in-memory encoding
    assert_eq!(std::fs::read(&path)?, writer.encode_chunks(&input)?);
    Ok(())
}

#[test]
fn test_write_file_replaces_previous_contents() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.wav");
    let writer = WavContainerWriter::new(WavFormat::new(1, 16000));

    writer.write_file(&path, &chunks(10, 1600, 1, 16000))?;
    writer.write_file(&path, &chunks(1, 16, 1, 16000))?;

    assert_eq!(std::fs::metadata(&path)?.len(), (WAV_HEADER_LEN + 32) as u64);
    Ok(())
}

#[test]
fn test_mismatched_chunk_format_is_rejected() {
    let writer = WavContainerWriter::new(WavFormat::new(2, 16000));
    let mono = chunks(1, 16, 1, 16000);

    assert!(writer.encode_chunks(&mono).is_err());
}

#[test]
fn test_more_than_two_channels_is_rejected() {
    let writer = WavContainerWriter::new(WavFormat::new(3, 16000));
    let samples: [&[i16]; 1] = [&[0, 0, 0]];

    assert!(writer.encode(samples).is_err());
}
