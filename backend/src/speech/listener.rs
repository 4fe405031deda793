use std::io::Cursor;
use std::time::Duration;

use super::SpeechError;
use crate::config::SpeechConfig;

/// A live stream of mono samples in `[-1, 1]`.
pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    /// Blocks until the next chunk is available. `None` once the stream ends.
    fn read_chunk(&mut self) -> Result<Option<Vec<f32>>, SpeechError>;
}

pub trait Microphone: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSource>, SpeechError>;
}

#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub calibration: Duration,
    pub timeout: Duration,
    pub phrase_time_limit: Duration,
    pub pause: Duration,
    pub energy_multiplier: f32,
    pub min_energy: f32,
}

impl From<&SpeechConfig> for ListenOptions {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            calibration: config.calibration(),
            timeout: config.timeout(),
            phrase_time_limit: config.phrase_time_limit(),
            pause: config.pause(),
            energy_multiplier: config.energy_multiplier,
            min_energy: config.min_energy,
        }
    }
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// 16-bit mono PCM WAV.
    pub fn to_wav(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for sample in &self.samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer.write_sample((clamped * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Measures ambient noise and returns the energy a chunk must exceed to count
/// as speech.
pub fn calibrate(source: &mut dyn AudioSource, options: &ListenOptions) -> Result<f32, SpeechError> {
    let budget = samples_for(options.calibration, source.sample_rate());
    let mut consumed = 0;
    let mut energy_sum = 0.0;
    let mut chunks = 0;

    while consumed < budget {
        let Some(chunk) = source.read_chunk()? else {
            break;
        };
        consumed += chunk.len();
        energy_sum += rms(&chunk);
        chunks += 1;
    }

    let ambient = if chunks == 0 { 0.0 } else { energy_sum / chunks as f32 };
    let threshold = (ambient * options.energy_multiplier).max(options.min_energy);
    log::debug!("Ambient energy {:.4}, speech threshold {:.4}", ambient, threshold);
    Ok(threshold)
}

/// Waits for a phrase to start and records it.
///
/// Time is counted in samples read, not wall clock. Fails with
/// [`SpeechError::Timeout`] when nothing louder than `threshold` arrives within
/// the timeout. Recording stops after a pause or at the phrase limit.
pub fn listen(
    source: &mut dyn AudioSource,
    options: &ListenOptions,
    threshold: f32,
) -> Result<CapturedAudio, SpeechError> {
    let sample_rate = source.sample_rate();
    let timeout = samples_for(options.timeout, sample_rate);
    let phrase_limit = samples_for(options.phrase_time_limit, sample_rate);
    let pause_limit = samples_for(options.pause, sample_rate);

    let mut waited = 0;
    let mut previous: Option<Vec<f32>> = None;
    let mut phrase: Vec<f32> = Vec::new();

    loop {
        let Some(chunk) = source.read_chunk()? else {
            return Err(SpeechError::Timeout);
        };
        if rms(&chunk) > threshold {
            if let Some(pre_roll) = previous.take() {
                phrase.extend_from_slice(&pre_roll);
            }
            phrase.extend_from_slice(&chunk);
            break;
        }
        waited += chunk.len();
        if waited >= timeout {
            return Err(SpeechError::Timeout);
        }
        previous = Some(chunk);
    }

    let mut silence = 0;
    while phrase.len() < phrase_limit {
        let Some(chunk) = source.read_chunk()? else {
            break;
        };
        if rms(&chunk) > threshold {
            silence = 0;
        } else {
            silence += chunk.len();
        }
        phrase.extend_from_slice(&chunk);
        if silence >= pause_limit {
            break;
        }
    }
    phrase.truncate(phrase_limit);

    Ok(CapturedAudio {
        samples: phrase,
        sample_rate,
    })
}
