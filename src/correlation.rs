//! Per-agent message-id generation and reply-chain tracking.
//!
//! Grounded on `correlation.py`'s `CorrelationEngine`, with one deliberate
//! deviation: the original keeps its counter on a process-global
//! `itertools.count`, shared across every `CorrelationEngine` instance in a
//! process. Each engine here owns its own counter instead, so two engines
//! constructed in the same process don't perturb each other's id sequence —
//! matching the per-agent ownership `model.py`/`tree.py` otherwise assume.

use std::collections::HashMap;

use crate::model::{Header, Message};

#[derive(Clone, Debug)]
pub struct CorrelationEngine {
    agent_id: String,
    counter: u64,
    last_received: Option<String>,
}

impl CorrelationEngine {
    pub fn new(agent_id: impl Into<String>) -> Self {
        CorrelationEngine {
            agent_id: agent_id.into(),
            counter: 0,
            last_received: None,
        }
    }

    /// `<agentId>-<counter>`, strictly increasing and unique for the
    /// lifetime of this engine.
    pub fn generate_message_id(&mut self) -> String {
        self.counter += 1;
        format!("{}-{}", self.agent_id, self.counter)
    }

    /// Updates `lastReceived` only when the incoming message carries a
    /// non-empty id.
    pub fn record_incoming(&mut self, message: &Message) {
        if !message.header.message_id.is_empty() {
            self.last_received = Some(message.header.message_id.clone());
        }
    }

    /// Build a header whose `correlation` is the stored `lastReceived`.
    pub fn create_response_header(
        &mut self,
        source: impl Into<String>,
        destination: impl Into<String>,
        timestamp: i64,
    ) -> Header {
        let message_id = self.generate_message_id();
        let mut header = Header::new(1, message_id, source, destination, timestamp);
        if let Some(corr) = &self.last_received {
            header = header.with_correlation(corr.clone());
        }
        header
    }

    /// Ignores the stored `lastReceived` slot and uses the passed message's
    /// id directly.
    pub fn create_header_in_response_to(
        &mut self,
        source: impl Into<String>,
        destination: impl Into<String>,
        timestamp: i64,
        incoming: &Message,
    ) -> Header {
        let message_id = self.generate_message_id();
        Header::new(1, message_id, source, destination, timestamp)
            .with_correlation(incoming.header.message_id.clone())
    }

    /// Convenience variant taking an explicit correlation id rather than
    /// deriving it from stored or incoming state.
    pub fn create_header_with_correlation(
        &mut self,
        source: impl Into<String>,
        destination: impl Into<String>,
        timestamp: i64,
        correlation_id: impl Into<String>,
    ) -> Header {
        let message_id = self.generate_message_id();
        Header::new(1, message_id, source, destination, timestamp).with_correlation(correlation_id)
    }

    pub fn get_state(&self) -> HashMap<String, String> {
        let mut state = HashMap::new();
        state.insert("agent_id".to_string(), self.agent_id.clone());
        state.insert("counter".to_string(), self.counter.to_string());
        if let Some(last) = &self.last_received {
            state.insert("last_received".to_string(), last.clone());
        }
        state
    }

    pub fn load_state(&mut self, state: &HashMap<String, String>) {
        if let Some(counter) = state.get("counter").and_then(|s| s.parse().ok()) {
            self.counter = counter;
        }
        self.last_received = state.get("last_received").cloned();
    }

    pub fn clear(&mut self) {
        self.counter = 0;
        self.last_received = None;
    }

    /// Walk backward via correlation pointers starting at `start_id`,
    /// stopping at a missing id or a revisit; returns the reversed chain
    /// (oldest first).
    pub fn trace_thread(messages: &[Message], start_id: &str) -> Vec<Message> {
        let by_id: HashMap<&str, &Message> = messages
            .iter()
            .map(|m| (m.header.message_id.as_str(), m))
            .collect();
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current_id = Some(start_id.to_string());
        while let Some(id) = current_id {
            if !seen.insert(id.clone()) {
                break;
            }
            let Some(message) = by_id.get(id.as_str()) else {
                break;
            };
            chain.push((*message).clone());
            current_id = message.header.correlation.clone();
        }
        chain.reverse();
        chain
    }

    /// All messages whose `correlation` equals `id`.
    pub fn find_responses<'a>(messages: &'a [Message], id: &str) -> Vec<&'a Message> {
        messages
            .iter()
            .filter(|m| m.header.correlation.as_deref() == Some(id))
            .collect()
    }

    /// Map from each message id to its immediate responders' ids.
    pub fn build_conversation_tree(messages: &[Message]) -> HashMap<String, Vec<String>> {
        let mut tree: HashMap<String, Vec<String>> = HashMap::new();
        for message in messages {
            if let Some(corr) = &message.header.correlation {
                tree.entry(corr.clone())
                    .or_default()
                    .push(message.header.message_id.clone());
            }
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique_and_increasing() {
        let mut engine = CorrelationEngine::new("agent1");
        assert_eq!(engine.generate_message_id(), "agent1-1");
        assert_eq!(engine.generate_message_id(), "agent1-2");
    }

    #[test]
    fn independent_engines_do_not_share_counters() {
        let mut a = CorrelationEngine::new("a");
        let mut b = CorrelationEngine::new("b");
        a.generate_message_id();
        a.generate_message_id();
        assert_eq!(b.generate_message_id(), "b-1");
    }

    #[test]
    fn record_incoming_updates_last_received() {
        let mut engine = CorrelationEngine::new("a");
        let header = Header::new(1, "msg-42", "x", "y", 0);
        let message = Message::new(header, Vec::new());
        engine.record_incoming(&message);
        let response = engine.create_response_header("a", "x", 1);
        assert_eq!(response.correlation.as_deref(), Some("msg-42"));
    }
}
