use crate::message::Message;
use crate::lock;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Unbounded FIFO shared between the reactor thread (producer) and the game
/// loop (consumer)
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: Message) {
        lock(&self.inner).push_back(message);
    }

    pub fn pop(&self) -> Option<Message> {
        lock(&self.inner).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.inner).clear();
    }
}
