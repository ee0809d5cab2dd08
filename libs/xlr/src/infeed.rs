use tracing::trace;

use crate::{Error, Literal, Result, Shape};

/// Unbounded FIFO of host values consumed by `infeed` operations.
///
/// Handles are cheap to clone and share the same queue, so one thread can
/// feed values while another executes a computation that blocks on them.
#[derive(Clone, Debug)]
pub struct InfeedChannel {
    tx: flume::Sender<Literal>,
    rx: flume::Receiver<Literal>,
}

impl Default for InfeedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InfeedChannel {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Enqueues a value. No shape check happens until it is consumed.
    pub fn transfer_to_infeed(&self, value: Literal) -> Result<()> {
        trace!(shape = %value.shape(), "infeed enqueue");
        self.tx.send(value).map_err(|_| Error::InfeedDisconnected)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Blocks until a value is available and checks it against `shape`.
    pub(crate) fn recv(&self, shape: &Shape) -> Result<Literal> {
        let value = self.rx.recv().map_err(|_| Error::InfeedDisconnected)?;
        let got = value.shape();
        if !shape.compatible(&got) {
            return Err(Error::InfeedShapeMismatch {
                expected: shape.clone(),
                got,
            });
        }
        trace!(shape = %got, "infeed dequeue");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let channel = InfeedChannel::new();
        for i in 1..=3 {
            channel.transfer_to_infeed(Literal::scalar(i)).unwrap();
        }
        assert_eq!(channel.len(), 3);
        let shape = Shape::array::<i32>(&[]);
        for i in 1..=3 {
            let value = channel.recv(&shape).unwrap();
            assert_eq!(value.get_first_element::<i32>().unwrap(), i);
        }
        assert!(channel.is_empty());
    }

    #[test]
    fn test_shape_checked_on_dequeue() {
        let channel = InfeedChannel::new();
        channel.transfer_to_infeed(Literal::scalar(1.0f32)).unwrap();
        let err = channel.recv(&Shape::array::<i32>(&[])).unwrap_err();
        assert_eq!(err.to_string(), "infeed value does not match, expected: s32[], got: f32[]");
    }

    #[test]
    fn test_blocks_until_fed() {
        let channel = InfeedChannel::new();
        let producer = channel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.transfer_to_infeed(Literal::scalar(7i64)).unwrap();
        });
        let value = channel.recv(&Shape::array::<i64>(&[])).unwrap();
        assert_eq!(value, Literal::scalar(7i64));
        handle.join().unwrap();
    }
}
