use std::sync::Arc;

use super::SpeechError;
use super::listener::{AudioSource, Microphone};

/// The system's default input device when built with `microphone`, otherwise a
/// stand-in that refuses to open.
pub fn default_microphone() -> Arc<dyn Microphone> {
    #[cfg(feature = "microphone")]
    {
        Arc::new(device::CpalMicrophone)
    }
    #[cfg(not(feature = "microphone"))]
    {
        log::warn!("Built without the microphone feature; speech input is unavailable");
        Arc::new(NoMicrophone)
    }
}

pub struct NoMicrophone;

impl Microphone for NoMicrophone {
    fn open(&self) -> Result<Box<dyn AudioSource>, SpeechError> {
        Err(SpeechError::Device(
            "microphone support is not enabled in this build".to_string(),
        ))
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(feature = "microphone")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream};
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
    use std::time::Duration;

    use super::downmix;
    use crate::speech::SpeechError;
    use crate::speech::listener::{AudioSource, Microphone};

    const STALL_TIMEOUT: Duration = Duration::from_secs(2);

    pub struct CpalMicrophone;

    /// Keeps the stream alive for as long as chunks are being read.
    struct CpalSource {
        _stream: Stream,
        receiver: Receiver<Vec<f32>>,
        sample_rate: u32,
    }

    fn device_error(err: impl std::fmt::Display) -> SpeechError {
        SpeechError::Device(err.to_string())
    }

    impl Microphone for CpalMicrophone {
        fn open(&self) -> Result<Box<dyn AudioSource>, SpeechError> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| SpeechError::Device("no input device available".to_string()))?;
            let supported = device.default_input_config().map_err(device_error)?;
            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels() as usize;
            let config = supported.config();
            let (sender, receiver) = mpsc::channel();
            let on_error = |err: cpal::StreamError| log::error!("Microphone stream error: {}", err);

            let stream = match supported.sample_format() {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let _ = sender.send(downmix(data, channels));
                    },
                    on_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let samples: Vec<f32> =
                            data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                        let _ = sender.send(downmix(&samples, channels));
                    },
                    on_error,
                    None,
                ),
                other => {
                    return Err(SpeechError::Device(format!(
                        "unsupported sample format {:?}",
                        other
                    )));
                }
            }
            .map_err(device_error)?;
            stream.play().map_err(device_error)?;

            log::info!(
                "Microphone opened: {} Hz, {} channel(s)",
                sample_rate,
                channels
            );
            Ok(Box::new(CpalSource {
                _stream: stream,
                receiver,
                sample_rate,
            }))
        }
    }

    impl AudioSource for CpalSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn read_chunk(&mut self) -> Result<Option<Vec<f32>>, SpeechError> {
            match self.receiver.recv_timeout(STALL_TIMEOUT) {
                Ok(chunk) => Ok(Some(chunk)),
                Err(RecvTimeoutError::Timeout) => Err(SpeechError::Device(
                    "microphone stopped delivering audio".to_string(),
                )),
                Err(RecvTimeoutError::Disconnected) => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }

    #[test]
    fn test_downmix_mono_is_identity() {
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_no_microphone_is_a_device_error() {
        assert!(matches!(NoMicrophone.open(), Err(SpeechError::Device(_))));
    }
}
