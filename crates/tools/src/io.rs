//! Where the user-facing tools read from and write to.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// A conversation channel with the human on the other side.
#[async_trait]
pub trait UserChannel: Send + Sync {
    /// Show a message to the user.
    async fn say(&self, message: &str) -> Result<(), String>;

    /// Show a prompt and wait for one line of input.
    async fn ask(&self, prompt: &str) -> Result<String, String>;
}

/// Standard output and standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleChannel;

#[async_trait]
impl UserChannel for ConsoleChannel {
    async fn say(&self, message: &str) -> Result<(), String> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{message}\n").as_bytes())
            .await
            .map_err(|e| format!("stdout: {e}"))?;
        stdout.flush().await.map_err(|e| format!("stdout: {e}"))
    }

    async fn ask(&self, prompt: &str) -> Result<String, String> {
        self.say(prompt).await?;
        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| format!("stdin: {e}"))?;
        if read == 0 {
            return Err("stdin closed".into());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// A channel with canned answers that records everything said to it.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    pub fn new(answers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Everything said or asked so far, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn log(&self, line: &str) {
        if let Ok(mut t) = self.transcript.lock() {
            t.push(line.to_string());
        }
    }
}

#[async_trait]
impl UserChannel for ScriptedChannel {
    async fn say(&self, message: &str) -> Result<(), String> {
        self.log(message);
        Ok(())
    }

    async fn ask(&self, prompt: &str) -> Result<String, String> {
        self.log(prompt);
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .ok_or_else(|| "no scripted answer left".to_string())
    }
}
