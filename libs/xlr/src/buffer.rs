use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::client::DeviceMemory;
use crate::{Client, Error, Literal, Result, Shape};

enum BufferState {
    Live(Arc<Literal>),
    Deleted,
}

/// A value resident in device memory.
///
/// A buffer is live until [`LocalBuffer::delete`] is called or it is dropped.
/// Once deleted, reading it or passing it to an executable fails with an
/// invalid argument error.
pub struct LocalBuffer {
    shape: Shape,
    size_bytes: usize,
    state: Mutex<BufferState>,
    memory: Arc<DeviceMemory>,
}

impl LocalBuffer {
    /// Copies `value` to the client's device.
    pub fn from_host(client: &Client, value: &Literal) -> Self {
        Self::from_device_value(client, Arc::new(value.clone()))
    }

    pub(crate) fn from_device_value(client: &Client, value: Arc<Literal>) -> Self {
        let size_bytes = value.size_bytes();
        let memory = client.memory().clone();
        memory.allocate(size_bytes);
        Self {
            shape: value.shape(),
            size_bytes,
            state: Mutex::new(BufferState::Live(value)),
            memory,
        }
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shape captured when the buffer was created.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_deleted(&self) -> bool {
        matches!(*self.state(), BufferState::Deleted)
    }

    /// Copies the contents back to the host.
    pub fn to_host(&self) -> Result<Literal> {
        Ok((*self.device_value()?).clone())
    }

    /// Releases the device memory. Deleting twice has no further effect.
    pub fn delete(&self) {
        let mut state = self.state();
        if let BufferState::Live(_) = *state {
            *state = BufferState::Deleted;
            self.memory.free(self.size_bytes);
            debug!(shape = %self.shape, bytes = self.size_bytes, "deleted buffer");
        }
    }

    pub(crate) fn device_value(&self) -> Result<Arc<Literal>> {
        match &*self.state() {
            BufferState::Live(value) => Ok(value.clone()),
            BufferState::Deleted => Err(Error::DeletedBuffer),
        }
    }

    pub(crate) fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }
}

impl Drop for LocalBuffer {
    fn drop(&mut self) {
        self.delete();
    }
}

impl std::fmt::Debug for LocalBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBuffer")
            .field("shape", &self.shape)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
