// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle notifications for graph observers.

use crate::graph::Graph;
use crate::link::LinkId;
use crate::node::NodeId;
use crate::pin::PinId;
use crate::property::PropertyId;
use std::fmt;

/// A change announced to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    /// Node is about to be removed; its pins are already gone
    NodeDeleted(NodeId),
    /// Pin is about to be removed; its links are already gone
    PinDeleted(PinId),
    /// Link is about to be removed
    LinkDeleted(LinkId),
    /// Property is about to be removed
    PropertyDeleted(PropertyId),
    /// Property value has changed
    PropertyModified(PropertyId),
}

/// Handle returned by [`Graph::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for every graph event
pub type Subscriber = Box<dyn FnMut(&Graph, &GraphEvent)>;

/// Ordered subscriber list
#[derive(Default)]
pub(crate) struct Subscribers {
    next: u64,
    entries: Vec<(SubscriptionId, Subscriber)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.entries.push((id, subscriber));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn dispatch(&mut self, graph: &Graph, event: &GraphEvent) {
        for (_, subscriber) in &mut self.entries {
            subscriber(graph, event);
        }
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.len())
            .finish()
    }
}
