use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::debug;

use crate::eval::{self, EvalContext};
use crate::{Client, Computation, Error, Literal, LocalBuffer, Result, Shape};

/// A computation compiled against one argument signature.
///
/// Executions take `&self` and are serialized internally. Concurrent callers
/// that both consume infeed values interleave their dequeues.
pub struct Executable {
    client: Client,
    computation: Computation,
    signature: Vec<Shape>,
    rng: Mutex<fastrand::Rng>,
}

/// Checks a signature against the computation's parameters, reporting the
/// parameter shape as expected and the signature shape as got.
pub(crate) fn check_signature(computation: &Computation, signature: &[Shape]) -> Result<()> {
    let params = computation.parameter_shapes();
    if params.len() != signature.len() {
        return Err(Error::ArgumentCountMismatch {
            expected: params.len(),
            got: signature.len(),
        });
    }
    for (parameter, (expected, got)) in params.iter().zip(signature).enumerate() {
        if !expected.compatible(got) {
            return Err(Error::InvalidArgumentShape {
                parameter,
                expected: expected.clone(),
                got: got.clone(),
            });
        }
    }
    Ok(())
}

impl Executable {
    pub(crate) fn new(client: Client, computation: Computation, signature: Vec<Shape>) -> Self {
        let rng = match client.compile_options().rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            client,
            computation,
            signature,
            rng: Mutex::new(rng),
        }
    }

    pub fn computation(&self) -> &Computation {
        &self.computation
    }

    /// Argument shapes this executable was compiled for.
    pub fn signature(&self) -> &[Shape] {
        &self.signature
    }

    pub fn result_shape(&self) -> &Shape {
        self.computation.result_shape()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn check_arguments(&self, arguments: &[&Literal]) -> Result<()> {
        check_signature(&self.computation, &self.signature)?;
        let shapes: Vec<Shape> = arguments.iter().map(|a| a.shape()).collect();
        check_signature(&self.computation, &shapes)
    }

    fn run(&self, arguments: &[&Literal]) -> Result<Literal> {
        self.check_arguments(arguments)?;
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ctx = EvalContext {
            rng: &mut rng,
            infeed: self.client.infeed(),
        };
        let start = Instant::now();
        let result = eval::evaluate(&self.computation, arguments, &mut ctx)?;
        debug!(
            computation = self.computation.name(),
            duration = ?start.elapsed(),
            "executed"
        );
        Ok(result)
    }

    /// Runs with host arguments bound positionally by parameter number.
    pub fn execute(&self, arguments: &[Literal]) -> Result<Literal> {
        let arguments: Vec<&Literal> = arguments.iter().collect();
        self.run(&arguments)
    }

    /// Runs with device buffers as arguments, leaving the result on the device.
    pub fn execute_with_local_buffers(&self, arguments: &[&LocalBuffer]) -> Result<LocalBuffer> {
        let values = arguments
            .iter()
            .map(|buffer| {
                self.client.owns(buffer)?;
                buffer.device_value()
            })
            .collect::<Result<Vec<Arc<Literal>>>>()?;
        let arguments: Vec<&Literal> = values.iter().map(|v| v.as_ref()).collect();
        let result = self.run(&arguments)?;
        Ok(LocalBuffer::from_device_value(&self.client, Arc::new(result)))
    }
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("computation", &self.computation.name())
            .field("signature", &self.signature)
            .finish()
    }
}
