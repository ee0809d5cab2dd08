use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::{Computation, Error, Executable, InfeedChannel, Literal, LocalBuffer, Result, Shape};

/// Options applied to every executable compiled by a [`Client`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompileOptions {
    /// Seed for the random number generator of each executable. Unset draws
    /// a fresh seed per executable.
    pub rng_seed: Option<u64>,
    /// Log signature mismatches when compiling. Mismatches are always
    /// reported as errors when executing.
    pub check_signature_at_compile: bool,
}

/// Tracks bytes held by live device buffers.
#[derive(Debug, Default)]
pub(crate) struct DeviceMemory {
    live_bytes: AtomicUsize,
}

impl DeviceMemory {
    pub(crate) fn allocate(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn free(&self, bytes: usize) {
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
    }
}

/// Local CPU device: compiles computations and owns device buffers and the
/// infeed channel.
#[derive(Clone, Debug)]
pub struct Client {
    compile_options: CompileOptions,
    infeed: InfeedChannel,
    memory: Arc<DeviceMemory>,
}

impl Client {
    pub fn cpu() -> Result<Self> {
        Ok(Self {
            compile_options: CompileOptions::default(),
            infeed: InfeedChannel::new(),
            memory: Arc::default(),
        })
    }

    pub fn with_options(mut self, compile_options: CompileOptions) -> Self {
        self.compile_options = compile_options;
        self
    }

    /// Shares an existing infeed channel with this client.
    pub fn with_infeed(mut self, infeed: InfeedChannel) -> Self {
        self.infeed = infeed;
        self
    }

    pub fn compile_options(&self) -> &CompileOptions {
        &self.compile_options
    }

    pub fn infeed(&self) -> &InfeedChannel {
        &self.infeed
    }

    pub fn transfer_to_infeed(&self, value: &Literal) -> Result<()> {
        self.infeed.transfer_to_infeed(value.clone())
    }

    /// Copies a host value into a new device buffer.
    pub fn buffer_from_host(&self, value: &Literal) -> LocalBuffer {
        LocalBuffer::from_host(self, value)
    }

    /// Bytes currently held by live buffers of this client.
    pub fn live_buffer_bytes(&self) -> usize {
        self.memory.live_bytes.load(Ordering::SeqCst)
    }

    pub(crate) fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }

    /// Compiles against the computation's own parameter shapes.
    pub fn compile(&self, computation: &Computation) -> Result<Executable> {
        self.compile_with_shapes(computation, &computation.parameter_shapes())
    }

    /// Compiles against an explicit argument signature. A signature that
    /// disagrees with the computation's parameters is accepted here and
    /// rejected when the executable runs.
    pub fn compile_with_shapes(
        &self,
        computation: &Computation,
        shapes: &[Shape],
    ) -> Result<Executable> {
        if self.compile_options.check_signature_at_compile {
            if let Err(err) = crate::executable::check_signature(computation, shapes) {
                warn!(?err, computation = computation.name(), "signature mismatch");
            }
        }
        debug!(
            computation = computation.name(),
            ops = computation.op_count(),
            parameters = shapes.len(),
            "compiled computation"
        );
        Ok(Executable::new(self.clone(), computation.clone(), shapes.to_vec()))
    }

    /// Compiles against the shapes of `arguments`; their contents are ignored.
    pub fn compile_with_example_arguments(
        &self,
        computation: &Computation,
        arguments: &[Literal],
    ) -> Result<Executable> {
        let shapes: Vec<Shape> = arguments.iter().map(Literal::shape).collect();
        self.compile_with_shapes(computation, &shapes)
    }

    pub(crate) fn owns(&self, buffer: &LocalBuffer) -> Result<()> {
        if !Arc::ptr_eq(&self.memory, buffer.memory()) {
            return Err(Error::ForeignBuffer);
        }
        Ok(())
    }
}
