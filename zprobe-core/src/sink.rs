//! Fire-and-forget report channel for the operator console.

use crossbeam_channel::Sender;

/// One-way text sink. Implementations must never block the run.
pub trait ReportSink {
    fn report(&self, message: &str);
}

/// Forwards every report to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&self, message: &str) {
        log::info!("{}", message);
    }
}

/// Sends reports over a channel; a full or disconnected channel drops them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<String>,
}

impl ChannelSink {
    pub fn new(sender: Sender<String>) -> Self {
        Self { sender }
    }
}

impl ReportSink for ChannelSink {
    fn report(&self, message: &str) {
        // Ignoring errors if the channel is full or closed.
        let _ = self.sender.try_send(message.to_string());
    }
}
