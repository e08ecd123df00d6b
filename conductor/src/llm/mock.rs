//! Scripted LLM for tests.
//!
//! Returns queued responses in order (the last one repeats once the queue is
//! drained) and records every prompt for assertions. Streaming splits the
//! response into whitespace-delimited chunks so tests observe real deltas.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{GenerateOptions, LlmClient, LlmError, LlmResponse, LlmUsage, MessageChunk};

enum Scripted {
    Text(String),
    Fail { status: u16, message: String },
}

/// Mock LLM client with scripted responses.
pub struct MockLlm {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    /// One response, repeated for every call.
    pub fn with_response(content: impl Into<String>) -> Self {
        Self::with_responses(vec![content.into()])
    }

    /// Responses consumed in order; the final one repeats afterwards.
    pub fn with_responses(contents: Vec<String>) -> Self {
        Self {
            script: Mutex::new(contents.into_iter().map(Scripted::Text).collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queues an HTTP-style failure before the remaining responses.
    pub fn fail_first(self, status: u16, message: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_front(Scripted::Fail {
            status,
            message: message.into(),
        });
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn next_reply(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Text(text)) => {
                *self.last.lock().unwrap() = Some(text.clone());
                Ok(text)
            }
            Some(Scripted::Fail { status, message }) => Err(LlmError::Http {
                provider: "mock".to_string(),
                status,
                message,
            }),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LlmError::InvalidResponse {
                    provider: "mock".to_string(),
                    message: "mock script exhausted".to_string(),
                }),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<LlmResponse, LlmError> {
        let content = self.next_reply(prompt)?;
        let completion_tokens = content.split_whitespace().count() as u32;
        let prompt_tokens = prompt.split_whitespace().count() as u32;
        Ok(LlmResponse {
            content,
            model: "mock-model".to_string(),
            provider: "mock".to_string(),
            usage: Some(LlmUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            finish_reason: Some("stop".to_string()),
            partial: false,
        })
    }

    async fn stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.generate(prompt, options).await?;
        if let Some(tx) = chunk_tx {
            let mut words = response.content.split_inclusive(' ').peekable();
            while let Some(word) = words.next() {
                if tx
                    .send(MessageChunk {
                        content: word.to_string(),
                    })
                    .await
                    .is_err()
                {
                    // Receiver dropped mid-stream.
                    let delivered: String = {
                        let total = &response.content;
                        let remaining: usize =
                            words.map(str::len).sum::<usize>();
                        total[..total.len() - remaining].to_string()
                    };
                    return Ok(LlmResponse {
                        content: delivered,
                        partial: true,
                        ..response
                    });
                }
            }
        }
        Ok(response)
    }
}
