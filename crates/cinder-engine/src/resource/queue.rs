use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{Error, Result};

use super::descriptor::ResourceDescriptor;
use super::handle::ResourceHandle;

/// Work submitted from outside the frame loop thread.
pub(crate) enum ResourceRequest {
    Create {
        descriptor: ResourceDescriptor,
        reply: Sender<Result<ResourceHandle>>,
    },
    Update {
        handle: ResourceHandle,
        offset: u64,
        data: Vec<u8>,
    },
    Destroy(ResourceHandle),
}

/// Thread-safe front door to the resource registry.
///
/// Requests are queued and only applied when the frame scheduler drains the
/// queue at the start of its update phase, never concurrently with drawing.
#[derive(Clone)]
pub struct ResourceRequester {
    tx: Sender<ResourceRequest>,
}

impl ResourceRequester {
    pub(crate) fn new(tx: Sender<ResourceRequest>) -> Self {
        Self { tx }
    }

    /// Queues a creation. The handle arrives through the returned `PendingResource`.
    pub fn create(&self, descriptor: impl Into<ResourceDescriptor>) -> PendingResource {
        let (reply, rx) = bounded(1);
        let request = ResourceRequest::Create {
            descriptor: descriptor.into(),
            reply,
        };
        if self.tx.send(request).is_err() {
            log::warn!("resource request dropped: registry is gone");
        }
        PendingResource { rx }
    }

    /// Queues a content replacement starting at byte `offset`.
    ///
    /// Failures (stale handle, out of range) are logged when the request is applied.
    pub fn update(&self, handle: ResourceHandle, offset: u64, data: Vec<u8>) {
        self.send(ResourceRequest::Update {
            handle,
            offset,
            data,
        });
    }

    pub fn destroy(&self, handle: ResourceHandle) {
        self.send(ResourceRequest::Destroy(handle));
    }

    fn send(&self, request: ResourceRequest) {
        if self.tx.send(request).is_err() {
            log::warn!("resource request dropped: registry is gone");
        }
    }
}

/// Result of a queued creation.
pub struct PendingResource {
    rx: Receiver<Result<ResourceHandle>>,
}

impl PendingResource {
    /// Returns the result once the registry has processed the request.
    pub fn try_get(&self) -> Option<Result<ResourceHandle>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(registry_gone())),
        }
    }

    /// Blocks until the registry has processed the request or `timeout` passes.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<ResourceHandle>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(registry_gone())),
        }
    }
}

fn registry_gone() -> Error {
    Error::DeviceLost("resource registry dropped before serving the request".into())
}
