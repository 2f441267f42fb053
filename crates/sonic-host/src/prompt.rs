//! Interactive replace confirmation.

use std::path::Path;

use async_trait::async_trait;
use sonic_core::{HostError, HostResult, ReplacePrompt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

/// Asks on a line-based reader until the answer is `y` or `n`.
pub struct LinePrompt<R> {
    reader: Mutex<R>,
}

/// Prompt reading answers from the process's standard input.
pub type ConsolePrompt = LinePrompt<BufReader<Stdin>>;

impl ConsolePrompt {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LinePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

#[async_trait]
impl<R> ReplacePrompt for LinePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn confirm_replace(&self, path: &Path) -> HostResult<bool> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            warn!(
                "folder {} already exists, would you like to replace it? (y/n)",
                path.display()
            );
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(HostError::Io("no answer, input closed".to_string()));
            }
            match line.trim() {
                "y" => return Ok(true),
                "n" => return Ok(false),
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeats_until_valid_answer() {
        let prompt = LinePrompt::new(&b"maybe\nY\ny\n"[..]);
        assert!(prompt.confirm_replace(Path::new("ext")).await.unwrap());
    }

    #[tokio::test]
    async fn test_answers_in_sequence() {
        let prompt = LinePrompt::new(&b"n\ny\n"[..]);
        assert!(!prompt.confirm_replace(Path::new("a")).await.unwrap());
        assert!(prompt.confirm_replace(Path::new("b")).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_input() {
        let prompt = LinePrompt::new(&b"what\n"[..]);
        assert!(matches!(
            prompt.confirm_replace(Path::new("ext")).await,
            Err(HostError::Io(_))
        ));
    }
}
