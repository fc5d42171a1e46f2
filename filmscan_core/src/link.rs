//! Receive side of the I2C peripheral.
//!
//! `I2cPeripheral::on_receive` is what the bus interrupt runs: it only decodes
//! complete 3-byte messages and pushes them into the shared channel.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::protocol::{COMMAND_LEN, Command, RawCommand};

#[derive(Clone, Debug)]
pub struct I2cPeripheral {
    channel: Arc<CommandChannel>,
}

impl I2cPeripheral {
    pub fn new(channel: Arc<CommandChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    /// Decode every complete message in `bytes` and queue those with a
    /// non-zero code. A trailing partial message is discarded. Returns the
    /// number of commands queued.
    pub fn on_receive(&self, bytes: &[u8]) -> usize {
        let mut chunks = bytes.chunks_exact(COMMAND_LEN);
        let mut queued = 0;
        for msg in &mut chunks {
            let code = msg[0];
            if code == 0 {
                continue;
            }
            let param = u16::from_le_bytes([msg[1], msg[2]]);
            if self.channel.push(code, param) {
                queued += 1;
            } else {
                warn!(code, param, "command channel full, dropping command");
            }
        }
        let rest = chunks.remainder();
        if !rest.is_empty() {
            debug!(bytes = rest.len(), "discarding partial command message");
        }
        queued
    }

    /// Host-side convenience: put one command on the bus.
    pub fn send(&self, command: Command) -> bool {
        self.send_raw(command.encode())
    }

    pub fn send_raw(&self, raw: RawCommand) -> bool {
        self.on_receive(&raw.to_wire()) == 1
    }
}
