//! Ordered packet sequence with per-packet attributes and a replay cursor.
//!
//! Nodes live in contiguous storage and are addressed by index; positions shown
//! to operators and used by configuration scopes are 1-based.

pub mod timing;

pub use timing::normalize_timing;

use crate::types::{Attr, Frame};

/// A captured frame together with its mutable replay attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceNode {
    pub frame: Frame,
    pub attr: Attr,
}

/// Capture-ordered packet store.
///
/// The cursor is `None` until [`Sequence::rewind`] finalizes the store for
/// replay, and again once [`Sequence::advance`] steps past the last node.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    nodes: Vec<SequenceNode>,
    cursor: Option<usize>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame with default attributes; returns its 1-based position.
    pub fn append(&mut self, frame: Frame) -> usize {
        self.nodes.push(SequenceNode { frame, attr: Attr::default() });
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reset the cursor to the first node (or `None` when empty).
    pub fn rewind(&mut self) {
        self.cursor = if self.nodes.is_empty() { None } else { Some(0) };
    }

    /// Move the cursor forward. Returns whether a node is still under it.
    pub fn advance(&mut self) -> bool {
        self.cursor = match self.cursor {
            Some(i) if i + 1 < self.nodes.len() => Some(i + 1),
            _ => None,
        };
        self.cursor.is_some()
    }

    pub fn current(&self) -> Option<&SequenceNode> {
        self.cursor.and_then(|i| self.nodes.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    /// 1-based position of the cursor.
    pub fn position(&self) -> Option<usize> {
        self.cursor.map(|i| i + 1)
    }

    pub fn node(&self, index: usize) -> Option<&SequenceNode> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut SequenceNode> {
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> &[SequenceNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [SequenceNode] {
        &mut self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SequenceNode> {
        self.nodes.iter()
    }
}

impl Extend<Frame> for Sequence {
    fn extend<I: IntoIterator<Item = Frame>>(&mut self, iter: I) {
        for frame in iter {
            self.append(frame);
        }
    }
}

impl FromIterator<Frame> for Sequence {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        let mut seq = Sequence::new();
        seq.extend(iter);
        seq
    }
}
