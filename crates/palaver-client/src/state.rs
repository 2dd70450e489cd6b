// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side message list.
//!
//! Deliveries arrive as full snapshots, single messages and poll batches, in
//! any order and possibly more than once. Everything is keyed by message id
//! and kept sorted by `(created_at, id)`, so every delivery path converges to
//! the same list.

use std::collections::HashSet;

use palaver_core::{ChatMessage, MessageId};

#[derive(Debug, Clone, Default)]
pub struct MessageState {
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
}

impl MessageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `message` unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        let key = (message.created_at, message.id);
        let at = self
            .messages
            .partition_point(|m| (m.created_at, m.id) <= key);
        self.messages.insert(at, message);
        true
    }

    /// Merges a batch, returning the messages that were new, in list order.
    pub fn merge<I>(&mut self, batch: I) -> Vec<ChatMessage>
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        let mut batch: Vec<ChatMessage> = batch.into_iter().collect();
        batch.sort_by_key(|m| (m.created_at, m.id));
        batch.into_iter().filter(|m| self.insert(m.clone())).collect()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
    }
}
