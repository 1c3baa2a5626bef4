//! Per-agent versioned fact store with subscriptions and delta propagation.
//!
//! Grounded on `knowledge.py`'s `KnowledgeEngine` — the largest single
//! component by budget share. Facts are stored as `topic -> (value,
//! version)` in an insertion-ordered map so `queryFacts`/`getAllFacts`
//! iterate deterministically.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::fold::FoldEngine;
use crate::model::{KnowledgeStatement, SubscribeStatement, UnsubscribeStatement, Value};

/// Topic pattern matching: bare `**` matches everything; a `*` segment
/// matches exactly one corresponding topic segment; a terminal `**`
/// segment matches that prefix or anything deeper (including the prefix
/// itself); any other segment must match literally.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "**" {
        return true;
    }
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let topic_segments: Vec<&str> = topic.split('.').collect();
    let mut pi = 0;
    let mut ti = 0;
    loop {
        if pi == pattern_segments.len() {
            return ti == topic_segments.len();
        }
        let seg = pattern_segments[pi];
        if seg == "**" {
            return true;
        }
        if ti >= topic_segments.len() {
            return false;
        }
        if seg == "*" || seg == topic_segments[ti] {
            pi += 1;
            ti += 1;
            continue;
        }
        return false;
    }
}

#[derive(Clone, Debug)]
pub struct KnowledgeEngine {
    agent_id: String,
    facts: IndexMap<String, (Value, i64)>,
    subscriptions: HashSet<String>,
    subscribers: IndexMap<String, HashSet<String>>,
    version_vector: HashMap<String, i64>,
    local_version: i64,
    knowledge_budget: usize,
}

impl KnowledgeEngine {
    pub fn new(agent_id: impl Into<String>) -> Self {
        KnowledgeEngine {
            agent_id: agent_id.into(),
            facts: IndexMap::new(),
            subscriptions: HashSet::new(),
            subscribers: IndexMap::new(),
            version_vector: HashMap::new(),
            local_version: 0,
            knowledge_budget: 256,
        }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.knowledge_budget = budget;
        self
    }

    pub fn assert_fact(&mut self, topic: impl Into<String>, value: Value) -> KnowledgeStatement {
        let topic = topic.into();
        self.local_version += 1;
        self.facts.insert(topic.clone(), (value.clone(), self.local_version));
        KnowledgeStatement {
            topic,
            value,
            version: self.local_version,
        }
    }

    pub fn get_fact(&self, topic: &str) -> Option<&(Value, i64)> {
        self.facts.get(topic)
    }

    pub fn query_facts(&self, pattern: &str) -> Vec<(&String, &(Value, i64))> {
        self.facts
            .iter()
            .filter(|(topic, _)| topic_matches(pattern, topic))
            .collect()
    }

    pub fn subscribe(&mut self, pattern: impl Into<String>) -> SubscribeStatement {
        let pattern = pattern.into();
        self.subscriptions.insert(pattern.clone());
        SubscribeStatement {
            topic: pattern,
            filter_expr: None,
        }
    }

    pub fn unsubscribe(&mut self, pattern: &str) -> UnsubscribeStatement {
        self.subscriptions.remove(pattern);
        UnsubscribeStatement {
            topic: pattern.to_string(),
        }
    }

    pub fn add_subscriber(&mut self, peer_id: impl Into<String>, pattern: impl Into<String>) {
        let peer_id = peer_id.into();
        self.subscribers
            .entry(peer_id.clone())
            .or_default()
            .insert(pattern.into());
        self.version_vector.entry(peer_id).or_insert(0);
    }

    pub fn remove_subscriber(&mut self, peer_id: &str, pattern: &str) {
        if let Some(patterns) = self.subscribers.get_mut(peer_id) {
            patterns.remove(pattern);
            if patterns.is_empty() {
                self.subscribers.shift_remove(peer_id);
                self.version_vector.remove(peer_id);
            }
        }
    }

    pub fn is_interested(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|p| topic_matches(p, topic))
    }

    /// Facts with `version > versionVector[peer]` whose topic matches any
    /// pattern the peer subscribed to, sorted by version ascending.
    pub fn compute_delta(&self, peer_id: &str) -> Vec<KnowledgeStatement> {
        let last_acked = self.version_vector.get(peer_id).copied().unwrap_or(0);
        let Some(patterns) = self.subscribers.get(peer_id) else {
            return Vec::new();
        };
        let mut delta: Vec<KnowledgeStatement> = self
            .facts
            .iter()
            .filter(|(_, (_, version))| *version > last_acked)
            .filter(|(topic, _)| patterns.iter().any(|p| topic_matches(p, topic)))
            .map(|(topic, (value, version))| KnowledgeStatement {
                topic: topic.clone(),
                value: value.clone(),
                version: *version,
            })
            .collect();
        delta.sort_by_key(|s| s.version);
        delta
    }

    /// Accept each incoming statement iff its topic is new or its version
    /// strictly exceeds the local entry's version. Does not bump
    /// `localVersion`. Returns the accepted statements.
    pub fn apply_incoming(
        &mut self,
        statements: &[KnowledgeStatement],
        _source_id: &str,
    ) -> Vec<KnowledgeStatement> {
        let mut accepted = Vec::new();
        for stmt in statements {
            let should_accept = match self.facts.get(&stmt.topic) {
                None => true,
                Some((_, existing_version)) => stmt.version > *existing_version,
            };
            if should_accept {
                self.facts
                    .insert(stmt.topic.clone(), (stmt.value.clone(), stmt.version));
                accepted.push(stmt.clone());
            }
        }
        accepted
    }

    /// Monotonic max update of `versionVector[peer]`.
    pub fn acknowledge_sync(&mut self, peer_id: impl Into<String>, version: i64) {
        let peer_id = peer_id.into();
        let entry = self.version_vector.entry(peer_id).or_insert(0);
        *entry = (*entry).max(version);
    }

    /// Fold the oldest `|facts| - budget` facts (among those at or below
    /// every peer's acknowledged version, or `localVersion` with no peers)
    /// into a single Fold whose state carries their `topic -> value` map.
    pub fn auto_fold(&mut self, fold_engine: &mut FoldEngine) -> Option<crate::model::FoldStatement> {
        if self.facts.len() <= self.knowledge_budget {
            return None;
        }
        let floor = if self.version_vector.is_empty() {
            self.local_version
        } else {
            *self.version_vector.values().min().unwrap()
        };
        let mut candidates: Vec<(String, Value, i64)> = self
            .facts
            .iter()
            .filter(|(_, (_, version))| *version <= floor)
            .map(|(topic, (value, version))| (topic.clone(), value.clone(), *version))
            .collect();
        candidates.sort_by_key(|(_, _, version)| *version);

        let overflow = self.facts.len() - self.knowledge_budget;
        if candidates.is_empty() {
            return None;
        }
        let take = overflow.min(candidates.len());
        let to_fold = &candidates[..take];

        let mut state = IndexMap::new();
        for (topic, value, _) in to_fold {
            state.insert(topic.clone(), value.clone());
        }
        for (topic, _, _) in to_fold {
            self.facts.shift_remove(topic);
        }
        let summary = format!("folded {} facts from agent '{}'", to_fold.len(), self.agent_id);
        debug!(agent_id = %self.agent_id, count = to_fold.len(), "auto-fold triggered");
        Some(fold_engine.fold(Vec::new(), summary, Some(state)))
    }

    pub fn get_all_facts(&self) -> &IndexMap<String, (Value, i64)> {
        &self.facts
    }

    pub fn get_fact_count(&self) -> usize {
        self.facts.len()
    }

    pub fn get_local_version(&self) -> i64 {
        self.local_version
    }

    pub fn get_subscriptions(&self) -> &HashSet<String> {
        &self.subscriptions
    }

    pub fn get_subscribers(&self) -> &IndexMap<String, HashSet<String>> {
        &self.subscribers
    }

    pub fn delete_fact(&mut self, topic: &str) -> Option<(Value, i64)> {
        self.facts.shift_remove(topic)
    }

    pub fn load_state(&mut self, facts: IndexMap<String, (Value, i64)>, local_version: i64) {
        self.facts = facts;
        self.local_version = local_version;
    }

    pub fn clear(&mut self) {
        self.facts.clear();
        self.subscriptions.clear();
        self.subscribers.clear();
        self.version_vector.clear();
        self.local_version = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_pattern_matching_table() {
        assert!(topic_matches("**", "anything.at.all"));
        assert!(topic_matches("a.*", "a.b"));
        assert!(!topic_matches("a.*", "a.b.c"));
        assert!(!topic_matches("a.*", "a"));
        assert!(topic_matches("a.**", "a"));
        assert!(topic_matches("a.**", "a.b"));
        assert!(topic_matches("a.**", "a.b.c"));
        assert!(!topic_matches("a.**", "ab"));
        assert!(topic_matches("system.cpu", "system.cpu"));
        assert!(!topic_matches("system.cpu", "system.mem"));
    }

    #[test]
    fn version_monotonicity() {
        let mut engine = KnowledgeEngine::new("agent1");
        engine.assert_fact("a", Value::Int(1));
        engine.assert_fact("b", Value::Int(2));
        engine.assert_fact("c", Value::Int(3));
        assert_eq!(engine.get_local_version(), 3);
        for (_, (_, version)) in engine.get_all_facts() {
            assert!(*version <= engine.get_local_version());
        }
    }

    #[test]
    fn scenario_3_knowledge_delta() {
        let mut engine = KnowledgeEngine::new("agent1");
        engine.assert_fact("system.cpu", Value::Int(50));
        engine.assert_fact("system.mem", Value::Int(60));
        engine.add_subscriber("peer", "system.*");
        engine.acknowledge_sync("peer", 2);
        engine.assert_fact("system.cpu", Value::Int(85));

        let delta = engine.compute_delta("peer");
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].topic, "system.cpu");
        assert_eq!(delta[0].version, 3);
        assert_eq!(delta[0].value, Value::Int(85));
    }

    #[test]
    fn apply_incoming_is_idempotent() {
        let mut engine = KnowledgeEngine::new("agent2");
        let stmt = KnowledgeStatement {
            topic: "x".to_string(),
            value: Value::Int(1),
            version: 5,
        };
        let accepted_first = engine.apply_incoming(std::slice::from_ref(&stmt), "peer");
        assert_eq!(accepted_first.len(), 1);
        let accepted_second = engine.apply_incoming(std::slice::from_ref(&stmt), "peer");
        assert!(accepted_second.is_empty());
    }

    #[test]
    fn remove_subscriber_drops_peer_when_last_pattern_removed() {
        let mut engine = KnowledgeEngine::new("agent1");
        engine.add_subscriber("peer", "a.*");
        engine.remove_subscriber("peer", "a.*");
        assert!(engine.get_subscribers().get("peer").is_none());
    }

    #[test]
    fn auto_fold_only_above_budget() {
        let mut engine = KnowledgeEngine::new("agent1").with_budget(2);
        let mut fold_engine = FoldEngine::new();
        engine.assert_fact("a", Value::Int(1));
        engine.assert_fact("b", Value::Int(2));
        assert!(engine.auto_fold(&mut fold_engine).is_none());
        engine.assert_fact("c", Value::Int(3));
        let folded = engine.auto_fold(&mut fold_engine);
        assert!(folded.is_some());
        assert_eq!(engine.get_fact_count(), 2);
    }
}
