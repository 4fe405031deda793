pub mod listener;
pub mod microphone;
pub mod synthesis;
pub mod transcribe;

use actix_web::web;
use std::sync::{Arc, Mutex};

use listener::{CapturedAudio, ListenOptions, Microphone, calibrate, listen};
use transcribe::Transcriber;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("No speech detected within timeout")]
    Timeout,
    #[error("Could not understand audio")]
    Unintelligible,
    #[error("Speech recognition error: {0}")]
    Service(String),
    #[error("Microphone error: {0}")]
    Device(String),
}

/// Captures one utterance from the microphone and transcribes it.
#[derive(Clone)]
pub struct SpeechRecognizer {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn Transcriber>,
    options: ListenOptions,
    // only one request may hold the input device
    device_lock: Arc<Mutex<()>>,
}

impl SpeechRecognizer {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn Transcriber>,
        options: ListenOptions,
    ) -> Self {
        Self {
            microphone,
            transcriber,
            options,
            device_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Calibrates against ambient noise, then listens for one phrase. Blocking.
    pub fn capture(&self) -> Result<CapturedAudio, SpeechError> {
        let _guard = self
            .device_lock
            .lock()
            .map_err(|_| SpeechError::Device("microphone lock poisoned".to_string()))?;

        let mut source = self.microphone.open()?;
        log::info!("Listening...");
        let threshold = calibrate(source.as_mut(), &self.options)?;
        let audio = listen(source.as_mut(), &self.options, threshold)?;
        log::info!("Captured {:.1}s of speech", audio.duration().as_secs_f32());
        Ok(audio)
    }

    pub async fn recognize(&self) -> Result<String, SpeechError> {
        let recognizer = self.clone();
        let audio = web::block(move || recognizer.capture())
            .await
            .map_err(|e| SpeechError::Device(e.to_string()))??;

        let text = self.transcriber.transcribe(&audio).await?;
        log::info!("Recognized speech: {}", text);
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::listener::testing::ScriptedSource;
    use super::listener::{AudioSource, CapturedAudio, Microphone};
    use super::transcribe::Transcriber;
    use super::SpeechError;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    /// Hands out one scripted source per `open`, silence once the script runs out.
    pub struct ScriptedMicrophone {
        levels: Mutex<Vec<Vec<f32>>>,
    }

    impl ScriptedMicrophone {
        pub fn silent() -> Self {
            Self {
                levels: Mutex::new(Vec::new()),
            }
        }

        pub fn speaking(levels: Vec<f32>) -> Self {
            Self {
                levels: Mutex::new(vec![levels]),
            }
        }
    }

    impl Microphone for ScriptedMicrophone {
        fn open(&self) -> Result<Box<dyn AudioSource>, SpeechError> {
            let script = self.levels.lock().unwrap().pop();
            Ok(match script {
                Some(levels) => Box::new(ScriptedSource::from_levels(&levels)),
                None => Box::new(ScriptedSource::silent()),
            })
        }
    }

    pub enum FixedTranscriber {
        Text(String),
        Empty,
        Down,
    }

    impl Transcriber for FixedTranscriber {
        fn transcribe<'a>(
            &'a self,
            _audio: &'a CapturedAudio,
        ) -> BoxFuture<'a, Result<String, SpeechError>> {
            let result = match self {
                FixedTranscriber::Text(text) => Ok(text.clone()),
                FixedTranscriber::Empty => Err(SpeechError::Unintelligible),
                FixedTranscriber::Down => Err(SpeechError::Service("503 Service Unavailable".to_string())),
            };
            Box::pin(async move { result })
        }
    }
}
