//! Mock serial port answering commands from a lookup table.

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::SerialTransport;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::time::sleep;

const DRIVER_TYPE: &str = "mock_serial";

#[derive(Debug, Default)]
struct PortState {
    /// Bytes written but not yet terminated
    inbound: Vec<u8>,
    /// Bytes waiting to be read
    pending: VecDeque<u8>,
    /// Complete commands received, oldest first
    received: Vec<String>,
}

/// Mock serial port.
///
/// Incoming bytes are split on `terminator`; each complete command found in
/// the response table queues its answer followed by the terminator. Unknown
/// commands queue nothing.
pub struct MockSerialPort {
    name: String,
    terminator: String,
    responses: HashMap<String, String>,
    state: Mutex<PortState>,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockSerialPort {
    /// Port with a `"\r"` terminator and no canned answers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terminator: "\r".to_string(),
            responses: HashMap::new(),
            state: Mutex::new(PortState::default()),
            timing: TimingConfig::serial(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Set the command terminator.
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    /// Answer `command` with `answer`.
    pub fn with_response(mut self, command: impl Into<String>, answer: impl Into<String>) -> Self {
        self.responses.insert(command.into(), answer.into());
        self
    }

    /// Set operational mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set error injection.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Complete commands received so far.
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Queue raw bytes as if the device sent them unprompted.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().pending.extend(bytes.iter().copied());
    }

    fn drain_commands(&self, state: &mut PortState) {
        let term = self.terminator.as_bytes();
        if term.is_empty() {
            return;
        }
        while let Some(end) = find(&state.inbound, term) {
            let command = String::from_utf8_lossy(&state.inbound[..end]).into_owned();
            state.inbound.drain(..end + term.len());
            if let Some(answer) = self.responses.get(&command) {
                state.pending.extend(answer.as_bytes().iter().copied());
                state.pending.extend(term.iter().copied());
            } else {
                tracing::debug!(port = %self.name, %command, "MockSerialPort: no answer");
            }
            state.received.push(command);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[async_trait]
impl SerialTransport for MockSerialPort {
    async fn write(&self, data: &[u8]) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "write")?;
        if self.mode.simulates_timing() {
            sleep(self.timing.communication()).await;
        }
        let mut state = self.state.lock();
        state.inbound.extend_from_slice(data);
        self.drain_commands(&mut state);
        Ok(())
    }

    async fn read(&self, max: usize) -> Result<Vec<u8>> {
        self.error_config.check_operation(DRIVER_TYPE, "read")?;
        let mut state = self.state.lock();
        let n = max.min(state.pending.len());
        Ok(state.pending.drain(..n).collect())
    }

    async fn purge(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.pending.clear();
        state.inbound.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_answer() {
        let port = MockSerialPort::new("COM1").with_response("VER", "v1.2");
        port.send_command("VER", "\r").await.unwrap();
        assert_eq!(port.read_answer("\r").await.unwrap(), "v1.2");
        assert_eq!(port.received(), vec!["VER".to_string()]);
    }

    #[tokio::test]
    async fn test_split_writes_and_unknown_command() {
        let port = MockSerialPort::new("COM1").with_response("POS?", "12");
        port.write(b"PO").await.unwrap();
        assert!(port.read(16).await.unwrap().is_empty());
        port.write(b"S?\rNOPE\r").await.unwrap();
        assert_eq!(port.read(16).await.unwrap(), b"12\r".to_vec());
        assert_eq!(port.received().len(), 2);
    }

    #[tokio::test]
    async fn test_purge_discards_pending() {
        let port = MockSerialPort::new("COM1");
        port.inject(b"garbage");
        port.purge().await.unwrap();
        assert!(port.read(64).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_respects_max() {
        let port = MockSerialPort::new("COM1");
        port.inject(b"abcdef");
        assert_eq!(port.read(4).await.unwrap(), b"abcd".to_vec());
        assert_eq!(port.read(4).await.unwrap(), b"ef".to_vec());
    }
}
