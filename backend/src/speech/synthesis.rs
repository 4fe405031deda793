use actix_web::web;
use std::io::{ErrorKind, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use crate::config::SynthesisConfig;

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("failed to feed text to {program}: {source}")]
    Input {
        program: String,
        source: std::io::Error,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("speech engine lock poisoned")]
    Poisoned,
    #[error("{0}")]
    Cancelled(String),
}

pub trait SpeechSynthesizer: Send + Sync {
    /// Speaks `text` and returns once playback has finished.
    fn speak(&self, text: &str) -> Result<(), SynthesisError>;
}

/// Drives an espeak-compatible command line engine. One utterance at a time.
pub struct CommandSynthesizer {
    program: String,
    rate: u32,
    lock: Mutex<()>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, rate: u32) -> Self {
        Self {
            program: program.into(),
            rate,
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        log::info!(
            "Speech synthesis via {} at {} words/min",
            config.program,
            config.rate
        );
        Self::new(config.program.clone(), config.rate)
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        let _guard = self.lock.lock().map_err(|_| SynthesisError::Poisoned)?;

        let mut child = Command::new(&self.program)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| SynthesisError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(source) = stdin.write_all(text.as_bytes()) {
                if source.kind() != ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    return Err(SynthesisError::Input {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
        }

        let status = child.wait().map_err(|source| SynthesisError::Wait {
            program: self.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(SynthesisError::Failed {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }
}

/// Runs the synthesizer on the blocking pool so playback never stalls a worker.
#[derive(Clone)]
pub struct SynthesisService {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl SynthesisService {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }

    pub async fn say(&self, text: String) -> Result<(), SynthesisError> {
        let synthesizer = self.synthesizer.clone();
        web::block(move || synthesizer.speak(&text))
            .await
            .map_err(|e| SynthesisError::Cancelled(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSynthesizer {
        pub spoken: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingSynthesizer {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn count(&self) -> usize {
            self.spoken.lock().unwrap().len()
        }
    }

    impl SpeechSynthesizer for RecordingSynthesizer {
        fn speak(&self, text: &str) -> Result<(), SynthesisError> {
            if self.fail {
                return Err(SynthesisError::Cancelled("audio device busy".to_string()));
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}
