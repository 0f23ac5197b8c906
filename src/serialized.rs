//! Worker-thread façade: operations are serialized through a channel.
//!
//! At construction the payloads are copied into a working buffer that a
//! dedicated worker thread owns outright; the caller's slice stays borrowed
//! by the handle and receives the final payloads back when the machine is
//! dropped. Callers package their arguments into a [`Transaction`] carrying
//! a one-shot acknowledgment channel, push it onto a bounded request channel,
//! and block until the worker answers. The worker executes transactions
//! strictly one at a time, so the kernel never sees concurrent access.
//!
//! The worker never touches caller memory: everything it reaches is owned by
//! its own closure. Leaking the handle therefore leaks the worker and skips
//! the write-back, but cannot leave the worker running against a dead
//! borrow.
//!
//! # Teardown
//!
//! Dropping the handle hangs up the request channel; the worker drains what
//! is left, hands its buffer back through the join handle, and the drop
//! copies the payloads into the caller's slice.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::Error;
use crate::kernel::Kernel;
use crate::machine::Boundaries;
use crate::slot_index::SlotIndex;

/// Capacity of the request channel; senders block (backpressure) once this
/// many transactions are waiting for the worker.
const REQUEST_QUEUE_CAPACITY: usize = 8;

/// One operation crossing into the worker, with its acknowledgment channel.
enum Transaction<Idx: SlotIndex, V> {
    Set {
        index: Idx,
        value: V,
        ack: Sender<Result<Idx, Error>>,
    },
    Unset {
        index: Idx,
        ack: Sender<Result<Idx, Error>>,
    },
    BookAndSet {
        value: V,
        ack: Sender<Result<(Idx, Idx), Error>>,
    },
    Available {
        ack: Sender<Idx>,
    },
    DumpLayout {
        ack: Sender<String>,
    },
}

/// Handle to a kernel owned by a worker thread.
pub(crate) struct SerializedMachine<'a, Idx: SlotIndex, V: Clone> {
    /// `None` only during drop, after the hang-up.
    requests: Option<Sender<Transaction<Idx, V>>>,
    /// Resolves to the worker's buffer once the request channel closes.
    worker: Option<JoinHandle<Vec<V>>>,
    /// The caller's slice; receives the worker's buffer back on drop.
    storage: Option<&'a mut [V]>,
}

impl<'a, Idx: SlotIndex, V: Clone + Send + 'static> SerializedMachine<'a, Idx, V> {
    /// Spawns a worker over a copy of `storage`.
    ///
    /// The geometry has already been validated by the public constructor.
    pub(crate) fn spawn(
        storage: &'a mut [V],
        empty: V,
        bucket_size: u8,
        boundaries: Boundaries,
    ) -> Self {
        let mut buffer = storage.to_vec();
        let (requests, inbox) = bounded(REQUEST_QUEUE_CAPACITY);
        let worker = std::thread::Builder::new()
            .name("slotmachine-worker".into())
            .spawn(move || {
                let kernel = Kernel::new(&mut buffer, empty, bucket_size, boundaries);
                run(kernel, inbox);
                buffer
            })
            .expect("failed to spawn slot machine worker");

        Self {
            requests: Some(requests),
            worker: Some(worker),
            storage: Some(storage),
        }
    }
}

impl<Idx: SlotIndex, V: Clone> SerializedMachine<'_, Idx, V> {
    pub(crate) fn set(&self, index: Idx, value: V) -> Result<Idx, Error> {
        let (ack, response) = bounded(1);
        self.send(Transaction::Set { index, value, ack });
        recv_ack(&response)
    }

    pub(crate) fn unset(&self, index: Idx) -> Result<Idx, Error> {
        let (ack, response) = bounded(1);
        self.send(Transaction::Unset { index, ack });
        recv_ack(&response)
    }

    pub(crate) fn book_and_set(&self, value: V) -> Result<(Idx, Idx), Error> {
        let (ack, response) = bounded(1);
        self.send(Transaction::BookAndSet { value, ack });
        recv_ack(&response)
    }

    pub(crate) fn available(&self) -> Idx {
        let (ack, response) = bounded(1);
        self.send(Transaction::Available { ack });
        recv_ack(&response)
    }

    pub(crate) fn dump_layout(&self) -> String {
        let (ack, response) = bounded(1);
        self.send(Transaction::DumpLayout { ack });
        recv_ack(&response)
    }

    fn send(&self, transaction: Transaction<Idx, V>) {
        let requests = self
            .requests
            .as_ref()
            .expect("request channel is only closed during drop");
        requests
            .send(transaction)
            .expect("slot machine worker exited while the handle was live");
    }
}

impl<Idx: SlotIndex, V: Clone> Drop for SerializedMachine<'_, Idx, V> {
    fn drop(&mut self) {
        // Hang up first so the worker's receive loop terminates.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(buffer) => {
                    if let Some(storage) = self.storage.take() {
                        storage.clone_from_slice(&buffer);
                    }
                }
                Err(_) => log::error!("slot machine worker panicked"),
            }
        }
    }
}

fn recv_ack<T>(response: &Receiver<T>) -> T {
    response
        .recv()
        .expect("slot machine worker dropped a transaction without answering")
}

/// Worker loop: one transaction at a time until every sender is gone.
fn run<Idx: SlotIndex, V: Clone>(
    mut kernel: Kernel<'_, Idx, V>,
    inbox: Receiver<Transaction<Idx, V>>,
) {
    log::debug!("slot machine worker started");

    for transaction in inbox {
        // A failed acknowledgment means the requester went away; the
        // operation itself has already been applied either way.
        match transaction {
            Transaction::Set { index, value, ack } => {
                let _ = ack.send(kernel.set(index, value));
            }
            Transaction::Unset { index, ack } => {
                let _ = ack.send(kernel.unset(index));
            }
            Transaction::BookAndSet { value, ack } => {
                let _ = ack.send(kernel.book_and_set(value));
            }
            Transaction::Available { ack } => {
                let _ = ack.send(kernel.available());
            }
            Transaction::DumpLayout { ack } => {
                let _ = ack.send(kernel.dump_layout());
            }
        }
    }

    log::debug!("slot machine worker exiting: request channel closed");
}
