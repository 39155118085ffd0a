// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::pin::PinId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A link between two pins.
///
/// `start` and `end` only record the order the pins were given in; the
/// direction of each pin decides which side feeds the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// First endpoint
    pub start: PinId,
    /// Second endpoint
    pub end: PinId,
}

impl Link {
    pub(crate) fn new(id: LinkId, start: PinId, end: PinId) -> Self {
        Self { id, start, end }
    }

    /// Check if this link involves a specific pin
    pub fn involves(&self, pin: PinId) -> bool {
        self.start == pin || self.end == pin
    }

    /// The endpoint that is not `pin`
    pub fn other_end(&self, pin: PinId) -> Option<PinId> {
        if self.start == pin {
            Some(self.end)
        } else if self.end == pin {
            Some(self.start)
        } else {
            None
        }
    }

    /// Both endpoints
    pub fn endpoints(&self) -> [PinId; 2] {
        [self.start, self.end]
    }
}
