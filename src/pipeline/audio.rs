//! Audio helpers built on symphonia, rubato and hound.
//!
//! Every clip that leaves the synthesizer is normalised to the same shape:
//! 16-bit PCM, mono, at the track sample rate. That makes timing a matter of
//! counting frames and concatenation a matter of appending samples.
//!
//! - [`decode_to_mono`]: any container symphonia can probe (WAV, MP3, …) →
//!   mono `f32` at the source rate
//! - [`resample`]: mono `f32` → mono `f32` at the target rate
//! - [`encode_wav`] / [`read_wav`]: 16-bit mono WAV in memory

use crate::model::AudioClip;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Source frames fed to rubato per `process()` call.
const RESAMPLE_CHUNK: usize = 2048;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to probe audio: {0}")]
    Probe(String),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("decoder failure: {0}")]
    Decode(String),

    #[error("resampler failure: {0}")]
    Resample(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unexpected WAV layout: {0}")]
    Layout(String),
}

/// Mono PCM in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode an encoded clip and downmix it to mono.
pub fn decode_to_mono(bytes: &[u8]) -> Result<MonoPcm, AudioError> {
    let source = Box::new(Cursor::new(bytes.to_vec()));
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Probe(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or(AudioError::NoTrack)?;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or_default();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut samples = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };
        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            return Err(AudioError::Decode("decoded audio had zero channels".into()));
        }
        sample_rate = spec.rate;

        let frames = decoded.capacity() as u64;
        let needed = frames * channels as u64;
        if scratch.as_ref().map_or(true, |b| (b.capacity() as u64) < needed) {
            scratch = Some(SampleBuffer::<f32>::new(frames, spec));
        }
        if let Some(buf) = scratch.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend(downmix_to_mono(buf.samples(), channels));
        }
    }

    Ok(MonoPcm {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels into one.
fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio. The output has exactly
/// `round(len * to / from)` frames.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, AudioError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from == 0 {
        return Err(AudioError::Resample("source sample rate is 0".into()));
    }

    let ratio = to as f64 / from as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let mut rs = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
        RESAMPLE_CHUNK,
        1,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    // rubato expects exact block sizes; pad the tail with zeros and add one
    // extra block to flush the filter delay.
    let in_max = rs.input_frames_max();
    let mut input = samples.to_vec();
    let rem = input.len() % in_max;
    if rem != 0 {
        input.resize(input.len() + (in_max - rem), 0.0);
    }
    input.resize(input.len() + in_max, 0.0);

    let mut out = Vec::with_capacity(expected + in_max);
    for block in input.chunks(in_max) {
        let processed = rs
            .process(&[block.to_vec()], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        let Some(channel) = processed.into_iter().next() else {
            return Err(AudioError::Resample("expected mono output".into()));
        };
        out.extend(channel);
        if out.len() >= expected {
            break;
        }
    }

    out.resize(expected, 0.0);
    Ok(out)
}

/// Encode mono `f32` samples as a 16-bit WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let pcm: Vec<i16> = samples.iter().map(|&s| f32_to_i16(s)).collect();
    encode_wav_i16(&pcm, sample_rate)
}

/// Encode mono 16-bit samples as a WAV.
pub fn encode_wav_i16(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        let mut w = writer.get_i16_writer(samples.len() as u32);
        for &s in samples {
            w.write_sample(s);
        }
        w.flush()?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Read a 16-bit mono WAV at `expected_rate`.
pub fn read_wav(bytes: &[u8], expected_rate: u32) -> Result<Vec<i16>, AudioError> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
        return Err(AudioError::Layout(format!(
            "expected 16-bit mono PCM, got {} ch / {} bit",
            spec.channels, spec.bits_per_sample
        )));
    }
    if spec.sample_rate != expected_rate {
        return Err(AudioError::Layout(format!(
            "expected {} Hz, got {} Hz",
            expected_rate, spec.sample_rate
        )));
    }
    reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(AudioError::from)
}

fn f32_to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Frames of `secs` seconds at `sample_rate`.
pub fn frames_for(secs: f64, sample_rate: u32) -> u64 {
    (secs.max(0.0) * sample_rate as f64).round() as u64
}

/// A clip of digital silence.
pub fn silence_clip(secs: f64, sample_rate: u32) -> Result<AudioClip, AudioError> {
    let frames = frames_for(secs, sample_rate);
    let bytes = encode_wav_i16(&vec![0i16; frames as usize], sample_rate)?;
    Ok(AudioClip {
        bytes,
        sample_rate,
        frames,
    })
}

/// Decode any supported clip and re-encode it as 16-bit mono WAV at
/// `sample_rate`. The frame count is measured from the decoded audio.
pub fn normalize_clip(bytes: &[u8], sample_rate: u32) -> Result<AudioClip, AudioError> {
    let pcm = decode_to_mono(bytes)?;
    let samples = resample(&pcm.samples, pcm.sample_rate, sample_rate)?;
    Ok(AudioClip {
        bytes: encode_wav(&samples, sample_rate)?,
        sample_rate,
        frames: samples.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix_to_mono(&[1.0, 3.0, -1.0, 1.0], 2), vec![2.0, 0.0]);
        assert_eq!(downmix_to_mono(&[0.5, -0.5], 1), vec![0.5, -0.5]);
    }

    #[test]
    fn wav_round_trip_keeps_frames() {
        let wav = encode_wav(&tone(2400, 24_000), 24_000).unwrap();
        let pcm = decode_to_mono(&wav).unwrap();
        assert_eq!(pcm.sample_rate, 24_000);
        assert_eq!(pcm.samples.len(), 2400);
        assert_eq!(read_wav(&wav, 24_000).unwrap().len(), 2400);
    }

    #[test]
    fn read_wav_rejects_wrong_rate() {
        let wav = encode_wav_i16(&[0; 10], 16_000).unwrap();
        assert!(matches!(read_wav(&wav, 24_000), Err(AudioError::Layout(_))));
    }

    #[test]
    fn resample_length_is_exact() {
        let out = resample(&tone(16_000, 16_000), 16_000, 24_000).unwrap();
        assert_eq!(out.len(), 24_000);
        let out = resample(&tone(4410, 44_100), 44_100, 24_000).unwrap();
        assert_eq!(out.len(), 2400);
    }

    #[test]
    fn normalize_converts_rate() {
        let wav = encode_wav(&tone(8000, 16_000), 16_000).unwrap();
        let clip = normalize_clip(&wav, 24_000).unwrap();
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.frames, 12_000);
        assert!((clip.duration_secs() - 0.5).abs() < 1e-9);
        assert_eq!(read_wav(&clip.bytes, 24_000).unwrap().len(), 12_000);
    }

    #[test]
    fn silence_has_requested_length() {
        let clip = silence_clip(2.0, 24_000).unwrap();
        assert_eq!(clip.frames, 48_000);
        assert!(read_wav(&clip.bytes, 24_000).unwrap().iter().all(|&s| s == 0));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode_to_mono(b"definitely not audio").is_err());
    }
}
