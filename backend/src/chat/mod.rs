pub mod generator;

use shared::{ChatRequest, InputType};
use std::sync::Arc;

use crate::speech::{SpeechError, SpeechRecognizer};
use generator::ResponseGenerator;

pub const FAREWELL: &str = "Goodbye! Have a great day!";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Empty input received")]
    EmptyInput,
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error("Response generation failed: {0}")]
    Generation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Farewell,
    Answer { response: String, user_input: String },
}

pub fn is_exit_command(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

#[derive(Clone)]
pub struct ChatService {
    generator: Arc<dyn ResponseGenerator>,
    recognizer: SpeechRecognizer,
}

impl ChatService {
    pub fn new(generator: Arc<dyn ResponseGenerator>, recognizer: SpeechRecognizer) -> Self {
        Self {
            generator,
            recognizer,
        }
    }

    pub async fn respond(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let user_input = match request.input_type {
            InputType::Speech => self.recognizer.recognize().await?,
            InputType::Text => request.message,
        };
        let user_input = user_input.trim();

        if user_input.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if is_exit_command(user_input) {
            return Ok(ChatReply::Farewell);
        }

        let response = self.generator.generate(user_input).await?;
        Ok(ChatReply::Answer {
            response,
            user_input: user_input.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ChatError;
    use super::generator::ResponseGenerator;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    /// Records every prompt it is asked to answer.
    #[derive(Default)]
    pub struct RecordingGenerator {
        pub prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl ResponseGenerator for RecordingGenerator {
        fn generate<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, ChatError>> {
            self.prompts.lock().unwrap().push(input.to_string());
            Box::pin(async move { Ok(format!("reply to {}", input)) })
        }
    }
}
