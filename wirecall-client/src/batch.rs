//! Request batching
//!
//! While a batch is open, requests are buffered instead of sent. Closing the
//! batch hands the whole buffer back in queue order so it can go out as one
//! JSON array payload. Ids are allocated by the manager, not here, so they
//! keep increasing across batches.
//!
//! `BatchState` has no locking of its own; the manager keeps it behind one
//! mutex, which is what makes "take the buffer and close" atomic with respect
//! to concurrent `request` calls.

use wirecall_core::{Error, JsonRpcRequest, Result};

#[derive(Debug, Default)]
pub struct BatchState {
    open: bool,
    buffer: Vec<JsonRpcRequest>,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open the batch; opening an open batch changes nothing
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn push(&mut self, request: JsonRpcRequest) {
        self.buffer.push(request);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Close the batch and take everything queued in it
    pub fn finish(&mut self) -> Result<Vec<JsonRpcRequest>> {
        if !self.open {
            return Err(Error::State(
                "cannot end that which has never started".to_string(),
            ));
        }
        self.open = false;
        Ok(std::mem::take(&mut self.buffer))
    }
}
