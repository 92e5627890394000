//! Outgoing command queue
//!
//! Multiple producer threads (UI, scripts) push commands; the single worker
//! thread drains them. `submit` never blocks: a full queue is reported to
//! the caller instead of stalling it.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::protocol::{OutgoingCommand, ProtocolError};

/// Default bound on queued commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Inner {
    items: VecDeque<OutgoingCommand>,
    closed: bool,
}

/// Thread-safe FIFO of pending outgoing commands
pub struct CommandQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl CommandQueue {
    /// Create a queue bounded at `capacity` commands
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
        }
    }

    /// Append a command without blocking.
    ///
    /// Fails with `QueueFull` when the bound is reached and `Stopped` once
    /// the engine has shut down; a command submitted after `stop()` is
    /// never processed, so it is refused outright.
    pub fn submit(&self, cmd: OutgoingCommand) -> Result<(), ProtocolError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ProtocolError::Stopped);
        }
        if inner.items.len() >= self.capacity {
            return Err(ProtocolError::QueueFull);
        }
        inner.items.push_back(cmd);
        Ok(())
    }

    /// Take every queued command, in submission order. Worker-only.
    pub fn drain_all(&self) -> Vec<OutgoingCommand> {
        let mut inner = self.inner.lock().unwrap();
        inner.items.drain(..).collect()
    }

    /// Refuse all further submissions
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }

    /// Number of commands currently waiting
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let queue = CommandQueue::new(8);
        queue
            .submit(OutgoingCommand::Simple {
                cmd_id: 1,
                payload: vec![],
            })
            .unwrap();
        queue.submit(OutgoingCommand::eeprom_read(0, 4)).unwrap();

        let drained = queue.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(matches!(
            drained[0],
            OutgoingCommand::Simple { cmd_id: 1, .. }
        ));
        assert!(matches!(drained[1], OutgoingCommand::Eeprom { .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_reports_without_blocking() {
        let queue = CommandQueue::new(1);
        queue.submit(OutgoingCommand::eeprom_read(0, 1)).unwrap();
        assert!(matches!(
            queue.submit(OutgoingCommand::eeprom_read(1, 1)),
            Err(ProtocolError::QueueFull)
        ));
    }

    #[test]
    fn closed_queue_refuses_submissions() {
        let queue = CommandQueue::new(4);
        queue.close();
        assert!(matches!(
            queue.submit(OutgoingCommand::eeprom_read(0, 1)),
            Err(ProtocolError::Stopped)
        ));
    }
}
