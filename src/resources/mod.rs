//! CPU-side resource descriptors.
//!
//! Every resource is a cheap, clonable handle around shared state. Device
//! objects are never stored here; the systems own those, keyed by
//! [`ResourceId`], one cache per device context.
//!
//! When a resource is destroyed (explicitly, or by dropping its last handle)
//! it notifies each system that holds native objects for it through a
//! [`DisposeRunner`]. The systems release those objects the next time they
//! run.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

pub mod buffer;
pub mod framebuffer;
pub mod geometry;
pub mod program;
pub mod state;
pub mod texture;
pub mod uniforms;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// The listeners to notify when a resource goes away.
#[derive(Default)]
pub(crate) struct DisposeRunner {
    listeners: RefCell<Vec<(u64, Sender<ResourceId>)>>,
}

impl DisposeRunner {
    /// Register `queue` once; repeated registration is ignored.
    pub fn add(&self, queue: &DisposeQueue) {
        let mut listeners = self.listeners.borrow_mut();
        if !listeners.iter().any(|(id, _)| *id == queue.subscriber) {
            listeners.push((queue.subscriber, queue.sender.clone()));
        }
    }

    /// Forget `queue`, e.g. after its system released the native object.
    pub fn remove(&self, queue: &DisposeQueue) {
        self.listeners
            .borrow_mut()
            .retain(|(id, _)| *id != queue.subscriber);
    }

    /// Notify and clear all listeners.
    pub fn emit(&self, id: ResourceId) {
        for (_, sender) in self.listeners.borrow_mut().drain(..) {
            // A closed receiver means the system is already gone.
            let _ = sender.send(id);
        }
    }
}

/// The receiving end each system keeps for disposal notifications.
pub(crate) struct DisposeQueue {
    subscriber: u64,
    sender: Sender<ResourceId>,
    receiver: Receiver<ResourceId>,
}

impl DisposeQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            subscriber: ResourceId::next().get(),
            sender,
            receiver,
        }
    }

    /// Ids disposed since the last call.
    pub fn drain(&self) -> Vec<ResourceId> {
        self.receiver.try_iter().collect()
    }
}
