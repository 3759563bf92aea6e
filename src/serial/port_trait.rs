//! Trait abstraction for the line supply to enable testing

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::line_reader::LineReader;
use crate::error::Result;
use crate::protocol::RawLine;

/// Outcome of one read from the line supply
#[derive(Debug, Clone)]
pub enum LineRead {
    Line(RawLine),
    /// No complete line within the read timeout
    Timeout,
}

/// Supplier of complete text lines from the stick
#[async_trait]
pub trait LineSource: Send {
    /// Wait for the next line. Must be cancel-safe: a dropped call loses no
    /// bytes already received.
    ///
    /// # Errors
    ///
    /// `LineSupplyClosed` or `Io` when the supply is lost
    async fn read_line(&mut self) -> Result<LineRead>;
}

#[async_trait]
impl<R> LineSource for LineReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_line(&mut self) -> Result<LineRead> {
        self.next_line().await
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted line supply; once the script runs out it never yields again
    pub struct ScriptedLines {
        script: VecDeque<Result<LineRead>>,
    }

    impl ScriptedLines {
        pub fn new(script: Vec<Result<LineRead>>) -> Self {
            Self {
                script: script.into(),
            }
        }

        pub fn lines(texts: &[&str]) -> Self {
            Self::new(
                texts
                    .iter()
                    .map(|t| Ok(LineRead::Line(RawLine::new(*t, crate::station::Timestamp::now()))))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl LineSource for ScriptedLines {
        async fn read_line(&mut self) -> Result<LineRead> {
            match self.script.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }
}
