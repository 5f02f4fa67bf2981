//! Structural Key Resolver
//!
//! Callers build a fresh `Message` on every request. The resolver interns
//! them: the first message of each shallow-equality class is stored in an
//! arena and its index becomes the canonical key for every later message that
//! is shallowly equal to it.
//!
//! The arena is never pruned. Invalidating or clearing cached responses
//! leaves the interned messages in place, so memory grows with the number of
//! distinct messages a `Messenger` has ever sent.

use crate::message::Message;
use std::fmt;

/// Canonical reference to one class of structurally equal messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(usize);

impl CanonicalKey {
    /// Arena index of the canonical message
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key-{}", self.0)
    }
}

/// Arena of interned messages
#[derive(Debug, Default)]
pub struct KeyResolver {
    seen: Vec<Message>,
}

impl KeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical key for `message`, interning it if unseen
    pub fn resolve(&mut self, message: &Message) -> CanonicalKey {
        if let Some(key) = self.lookup(message) {
            return key;
        }

        let key = CanonicalKey(self.seen.len());
        tracing::trace!(kind = message.kind(), %key, "Interning new message");
        self.seen.push(message.clone());
        key
    }

    /// Find the canonical key without interning
    pub fn lookup(&self, message: &Message) -> Option<CanonicalKey> {
        self.seen
            .iter()
            .position(|candidate| {
                candidate.key_count() == message.key_count() && candidate.shallow_eq(message)
            })
            .map(CanonicalKey)
    }

    /// Canonical twin of a message whose nested fields were freshly built.
    ///
    /// Decoded messages wrap every nested value in a new `Arc`, so they never
    /// match shallowly. When an interned message has the same content, its
    /// clone (sharing the interned `Arc`s) is returned instead.
    pub fn share_nested(&self, message: Message) -> Message {
        if !message.has_nested() {
            return message;
        }

        match self.seen.iter().find(|candidate| {
            candidate.key_count() == message.key_count() && candidate.deep_eq(&message)
        }) {
            Some(canonical) => canonical.clone(),
            None => message,
        }
    }

    /// The message chosen to represent `key`
    pub fn canonical(&self, key: CanonicalKey) -> Option<&Message> {
        self.seen.get(key.0)
    }

    /// Number of distinct messages interned so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
