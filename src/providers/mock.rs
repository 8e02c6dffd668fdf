/*!
 * Mock provider implementation for testing.
 *
 * This module provides a scripted provider that simulates different behaviors:
 * - `MockProvider::working()` - Echoes every entry back as "[TRANSLATED] ..."
 * - `MockProvider::failing(error)` - Always fails with the given error
 * - `with_script` - Plays a list of replies in order before falling back
 * - `fail_credential` - Fails every call made with one credential
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{CredentialId, CredentialLease};
use crate::errors::ProviderError;
use crate::providers::CompletionProvider;
use crate::translation::client::{END_MARKER, entry_marker, extract_entries};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Translate every entry of the prompt
    Echo,
    /// Return this text verbatim
    Text(String),
    /// Fail with this error
    Fail(ProviderError),
}

/// A call received by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub credential_id: CredentialId,
    pub prompt: String,
}

impl MockCall {
    /// Texts of the entries sent in this call
    pub fn entries(&self) -> Vec<String> {
        extract_entries(&self.prompt).into_iter().map(|(_, text)| text).collect()
    }
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    calls: Vec<MockCall>,
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_reply: MockReply,
    state: Arc<Mutex<MockState>>,
    credential_failures: Arc<HashMap<CredentialId, ProviderError>>,
    delay: Option<Duration>,
    responder: Option<fn(&str) -> String>,
}

impl MockProvider {
    fn new(default_reply: MockReply) -> Self {
        Self {
            default_reply,
            state: Arc::new(Mutex::new(MockState::default())),
            credential_failures: Arc::new(HashMap::new()),
            delay: None,
            responder: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockReply::Echo)
    }

    /// Create a failing mock provider that always errors
    pub fn failing(error: ProviderError) -> Self {
        Self::new(MockReply::Fail(error))
    }

    /// Replies played in order; once used up the default behavior applies
    pub fn with_script(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.state.lock().script.extend(replies);
        self
    }

    /// Every call made with `credential` fails with `error`
    pub fn fail_credential(mut self, credential: CredentialId, error: ProviderError) -> Self {
        let mut failures = (*self.credential_failures).clone();
        failures.insert(credential, error);
        self.credential_failures = Arc::new(failures);
        self
    }

    /// Simulate a slow service
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Produce echo replies with a custom function of the entry text
    pub fn with_responder(mut self, responder: fn(&str) -> String) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Generate a properly formatted batch response with markers
    pub fn generate_batch_response(entries: &[&str]) -> String {
        let mut response = String::new();
        for (i, entry) in entries.iter().enumerate() {
            response.push_str(&entry_marker(i));
            response.push('\n');
            response.push_str(&format!("[TRANSLATED] {}\n", entry));
        }
        response.push_str(END_MARKER);
        response
    }

    fn echo(&self, prompt: &str) -> String {
        let mut response = String::new();
        for (ordinal, text) in extract_entries(prompt) {
            response.push_str(&entry_marker(ordinal));
            response.push('\n');
            match self.responder {
                Some(responder) => response.push_str(&responder(&text)),
                None => {
                    let translated: Vec<String> = text.lines().map(|l| format!("[TRANSLATED] {}", l)).collect();
                    response.push_str(&translated.join("\n"));
                }
            }
            response.push('\n');
        }
        response.push_str(END_MARKER);
        response
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, credential: &CredentialLease, prompt: &str) -> Result<String, ProviderError> {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(MockCall {
                credential_id: credential.id(),
                prompt: prompt.to_string(),
            });
            state.script.pop_front()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.credential_failures.get(&credential.id()) {
            return Err(error.clone());
        }

        match reply.unwrap_or_else(|| self.default_reply.clone()) {
            MockReply::Echo => Ok(self.echo(prompt)),
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(error) => Err(error),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
