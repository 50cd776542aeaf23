//! # Bus Messages
//!
//! The unit carried by the gossip bus.

use std::sync::Arc;

/// A payload published on a named topic.
///
/// The payload is shared between subscribers, so fan-out does not copy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    /// Topic the message was published on.
    pub topic: Arc<str>,
    /// Opaque payload bytes.
    pub data: Arc<[u8]>,
}

impl TopicMessage {
    /// Create a new message.
    pub fn new(topic: &str, data: Vec<u8>) -> Self {
        Self {
            topic: Arc::from(topic),
            data: Arc::from(data),
        }
    }

    /// Whether this message was published on `topic`.
    #[must_use]
    pub fn is_on(&self, topic: &str) -> bool {
        &*self.topic == topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_match() {
        let msg = TopicMessage::new("ccq_req", vec![1, 2, 3]);
        assert!(msg.is_on("ccq_req"));
        assert!(!msg.is_on("ccq_resp"));
        assert_eq!(&*msg.data, &[1, 2, 3]);
    }
}
