//! Bottom-up execution of a tree of cooperating agents.
//!
//! Grounded on `grove.py`'s `Grove`/`AgentRunner`/`EchoAgentRunner`. The
//! LLM-backed runner (`LLMAgentRunner`, HTTP calls to a model provider) is
//! out of scope per the Non-goals on LLM clients; only the trivial
//! echo/closure runners used by the original's own test fixtures are
//! carried over, gated behind `test-support`.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use crate::correlation::CorrelationEngine;
use crate::error::{Error, TopologyError};
use crate::model::{Message, Statement, Value};
use crate::tree::{AgentNode, TreeEngine};

pub type OnAgentStart = Box<dyn Fn(&AgentNode, &str) + Send + Sync>;
pub type OnAgentDone = Box<dyn Fn(&AgentNode, &IndexMap<String, String>) + Send + Sync>;
pub type OnPropagate = Box<dyn Fn(&AgentNode, &AgentNode, &Message) + Send + Sync>;

/// The external collaborator that actually does the agent's work. The
/// grove asserts nothing on its behalf — a runner that wants its returned
/// facts reflected in `node.knowledge` must assert them itself.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        node: &mut AgentNode,
        task: &str,
        child_facts: &IndexMap<String, String>,
    ) -> IndexMap<String, String>;
}

/// No-API fallback runner used by the crate's own tests. If
/// `node.metadata["topics"]` is a non-empty list, asserts one fact per
/// topic; otherwise asserts a single `{role}.analysis` fact.
#[cfg(any(test, feature = "test-support"))]
pub struct EchoRunner;

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl AgentRunner for EchoRunner {
    async fn run(
        &self,
        node: &mut AgentNode,
        task: &str,
        _child_facts: &IndexMap<String, String>,
    ) -> IndexMap<String, String> {
        let mut facts = IndexMap::new();
        let topics = match node.metadata.get("topics") {
            Some(Value::List(items)) if !items.is_empty() => {
                items.iter().filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                }).collect::<Vec<_>>()
            }
            _ => Vec::new(),
        };
        if topics.is_empty() {
            let topic = format!("{}.analysis", node.role);
            let value = format!("[{}] analysis for: {task}", node.role);
            node.knowledge.assert_fact(topic.clone(), Value::String(value.clone()));
            facts.insert(topic, value);
        } else {
            for topic in topics {
                let value = format!("[{}] Analysis for {topic} on: {task}", node.role);
                node.knowledge.assert_fact(topic.clone(), Value::String(value.clone()));
                facts.insert(topic, value);
            }
        }
        facts
    }
}

/// Wraps a plain closure as an `AgentRunner`, for ad hoc test fixtures.
#[cfg(any(test, feature = "test-support"))]
pub struct FnRunner<F>(pub F)
where
    F: Fn(&mut AgentNode, &str, &IndexMap<String, String>) -> IndexMap<String, String> + Send + Sync;

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl<F> AgentRunner for FnRunner<F>
where
    F: Fn(&mut AgentNode, &str, &IndexMap<String, String>) -> IndexMap<String, String> + Send + Sync,
{
    async fn run(
        &self,
        node: &mut AgentNode,
        task: &str,
        child_facts: &IndexMap<String, String>,
    ) -> IndexMap<String, String> {
        (self.0)(node, task, child_facts)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroveResult {
    pub facts: IndexMap<String, Value>,
    pub messages: Vec<Message>,
    pub agents_run: usize,
    pub levels_processed: usize,
}

impl GroveResult {
    /// Human-readable "Grove Execution Report" text, matching the
    /// original's `_build_report` shape plus the tree's ASCII render.
    pub fn report(&self, tree: &TreeEngine) -> String {
        let mut out = String::new();
        out.push_str("Grove Execution Report\n");
        out.push_str(&"=".repeat(40));
        out.push('\n');
        out.push_str(&format!("Agents run: {}\n", self.agents_run));
        out.push_str(&format!("Levels processed: {}\n", self.levels_processed));
        out.push_str(&format!("Messages propagated: {}\n", self.messages.len()));
        out.push('\n');
        out.push_str(&tree.render_ascii());
        out.push('\n');
        let mut topics: Vec<&String> = self.facts.keys().collect();
        topics.sort();
        for topic in topics {
            out.push_str(&format!("{topic}: {}\n", self.facts[topic]));
        }
        out.push_str(&"=".repeat(40));
        out.push('\n');
        out
    }
}

#[derive(Default)]
pub struct Grove {
    pub on_agent_start: Option<OnAgentStart>,
    pub on_agent_done: Option<OnAgentDone>,
    pub on_propagate: Option<OnPropagate>,
}

impl Grove {
    pub fn new() -> Self {
        Grove::default()
    }

    /// 1. `setupSubscriptions("**")`. 2. For each level bottom-up, for each
    /// node: gather child facts, run the agent, propagate accepted facts to
    /// the parent. 3. Return root facts, the message log, and counters.
    pub async fn execute(
        &self,
        tree: &mut TreeEngine,
        runner: &dyn AgentRunner,
        task: &str,
    ) -> Result<GroveResult, Error> {
        tree.setup_subscriptions("**");
        let levels = tree.get_levels_bottom_up();
        let mut message_log = Vec::new();
        let mut agents_run = 0usize;

        for level in &levels {
            for node_id in level {
                let child_ids = tree
                    .get_node(node_id)
                    .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(node_id.clone())))?
                    .children
                    .clone();
                let child_facts = gather_child_facts(tree, &child_ids);

                if let Some(cb) = &self.on_agent_start {
                    cb(tree.get_node(node_id).expect("node exists"), task);
                }

                let facts = {
                    let node = tree
                        .get_node_mut(node_id)
                        .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(node_id.clone())))?;
                    runner.run(node, task, &child_facts).await
                };
                agents_run += 1;

                if let Some(cb) = &self.on_agent_done {
                    cb(tree.get_node(node_id).expect("node exists"), &facts);
                }

                let is_root = tree.get_node(node_id).expect("node exists").parent.is_none();
                if !is_root {
                    let accepted = tree.propagate_up(node_id)?;
                    if !accepted.is_empty() {
                        let parent_id = tree
                            .get_node(node_id)
                            .expect("node exists")
                            .parent
                            .clone()
                            .expect("non-root has a parent");
                        let header = {
                            let child = tree.get_node_mut(node_id).expect("node exists");
                            child
                                .correlation
                                .create_response_header(node_id.clone(), parent_id.clone(), now_seconds())
                        };
                        let message = Message::new(
                            header,
                            accepted.into_iter().map(Statement::Knowledge).collect(),
                        );
                        {
                            let parent = tree.get_node_mut(&parent_id).expect("parent exists");
                            parent.correlation.record_incoming(&message);
                        }
                        if let Some(cb) = &self.on_propagate {
                            cb(
                                tree.get_node(node_id).expect("node exists"),
                                tree.get_node(&parent_id).expect("parent exists"),
                                &message,
                            );
                        }
                        message_log.push(message);
                    }
                }
            }
        }

        let root = tree.get_root()?;
        let facts: IndexMap<String, Value> = root
            .knowledge
            .get_all_facts()
            .iter()
            .map(|(topic, (value, _))| (topic.clone(), value.clone()))
            .collect();

        debug!(agents_run, levels = levels.len(), "grove execution complete");

        Ok(GroveResult {
            facts,
            messages: message_log,
            agents_run,
            levels_processed: levels.len(),
        })
    }
}

#[cfg(feature = "parallel-siblings")]
impl Grove {
    /// Same bottom-up traversal as [`Self::execute`], but every node within
    /// a level runs concurrently: each sibling's agent task takes exclusive
    /// ownership of its own `AgentNode` (via [`TreeEngine::take_node`]) for
    /// the duration of `runner.run`, so the runner itself never contends on
    /// a lock. Only the propagation step that follows — reinserting the
    /// node and applying its delta to the parent — touches the shared tree,
    /// and that's serialized behind a `tokio::sync::Mutex` shared across the
    /// level's `JoinSet`.
    pub async fn execute_concurrent(
        &self,
        tree: &mut TreeEngine,
        runner: std::sync::Arc<dyn AgentRunner>,
        task: &str,
    ) -> Result<GroveResult, Error> {
        let owned = std::mem::take(tree);
        let shared = std::sync::Arc::new(tokio::sync::Mutex::new(owned));
        shared.lock().await.setup_subscriptions("**");
        let levels = shared.lock().await.get_levels_bottom_up();

        let message_log = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::<Message>::new()));
        let agents_run = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for level in &levels {
            let mut join_set = tokio::task::JoinSet::new();
            for node_id in level.clone() {
                let shared = shared.clone();
                let runner = runner.clone();
                let task = task.to_string();
                let message_log = message_log.clone();
                let agents_run = agents_run.clone();
                join_set.spawn(async move {
                    let (mut node, child_ids) = {
                        let mut guard = shared.lock().await;
                        let child_ids = guard
                            .get_node(&node_id)
                            .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(node_id.clone())))?
                            .children
                            .clone();
                        let node = guard
                            .take_node(&node_id)
                            .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(node_id.clone())))?;
                        (node, child_ids)
                    };
                    let child_facts = {
                        let guard = shared.lock().await;
                        gather_child_facts(&guard, &child_ids)
                    };

                    runner.run(&mut node, &task, &child_facts).await;
                    agents_run.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    let is_root = node.parent.is_none();

                    let mut guard = shared.lock().await;
                    guard.put_node(node_id.clone(), node);
                    if !is_root {
                        let accepted = guard.propagate_up(&node_id)?;
                        if !accepted.is_empty() {
                            let parent_id = guard
                                .get_node(&node_id)
                                .expect("just reinserted")
                                .parent
                                .clone()
                                .expect("non-root has a parent");
                            let header = {
                                let child = guard.get_node_mut(&node_id).expect("just reinserted");
                                child.correlation.create_response_header(
                                    node_id.clone(),
                                    parent_id.clone(),
                                    now_seconds(),
                                )
                            };
                            let message = Message::new(
                                header,
                                accepted.into_iter().map(Statement::Knowledge).collect(),
                            );
                            guard
                                .get_node_mut(&parent_id)
                                .expect("parent exists")
                                .correlation
                                .record_incoming(&message);
                            message_log.lock().await.push(message);
                        }
                    }
                    Ok::<(), Error>(())
                });
            }
            while let Some(res) = join_set.join_next().await {
                res.expect("agent task panicked")?;
            }
        }

        let guard = shared.lock().await;
        let facts: IndexMap<String, Value> = guard
            .get_root()?
            .knowledge
            .get_all_facts()
            .iter()
            .map(|(topic, (value, _))| (topic.clone(), value.clone()))
            .collect();
        drop(guard);

        *tree = std::sync::Arc::try_unwrap(shared)
            .unwrap_or_else(|_| panic!("agent tasks outlived execute_concurrent"))
            .into_inner();
        let messages = message_log.lock().await.clone();
        let total = agents_run.load(std::sync::atomic::Ordering::Relaxed);

        debug!(agents_run = total, levels = levels.len(), "concurrent grove execution complete");

        Ok(GroveResult {
            facts,
            messages,
            agents_run: total,
            levels_processed: levels.len(),
        })
    }
}

fn gather_child_facts(tree: &TreeEngine, child_ids: &[String]) -> IndexMap<String, String> {
    let mut facts = IndexMap::new();
    for child_id in child_ids {
        if let Some(child) = tree.get_node(child_id) {
            for (topic, (value, _)) in child.knowledge.get_all_facts() {
                facts.insert(topic.clone(), value.to_string());
            }
        }
    }
    facts
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Build a propagation message without going through a `Grove` — exposed
/// for `InteractiveGrove`/`ChatSession`, which replicate this one step at a
/// time rather than via `Grove::execute`.
pub fn build_propagation_message(
    correlation: &mut CorrelationEngine,
    child_id: &str,
    parent_id: &str,
    statements: Vec<Statement>,
) -> Message {
    let header = correlation.create_response_header(child_id, parent_id, now_seconds());
    Message::new(header, statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> TreeEngine {
        let mut tree = TreeEngine::new();
        tree.add_root("root", "coordinator").unwrap();
        tree.add_child("root", "lead", "lead").unwrap();
        tree.add_child("lead", "w1", "worker").unwrap();
        tree.add_child("lead", "w2", "worker").unwrap();
        tree
    }

    #[tokio::test]
    async fn scenario_4_bottom_up_ordering() {
        let mut tree = sample_tree();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let order_clone = order.clone();
        let grove = Grove {
            on_agent_start: Some(Box::new(move |node, _task| {
                order_clone.lock().unwrap().push(node.agent_id.clone());
            })),
            on_agent_done: None,
            on_propagate: None,
        };
        let runner = EchoRunner;
        grove.execute(&mut tree, &runner, "do the thing").await.unwrap();
        let seen = order.lock().unwrap().clone();
        let w1_idx = seen.iter().position(|id| id == "w1").unwrap();
        let w2_idx = seen.iter().position(|id| id == "w2").unwrap();
        let lead_idx = seen.iter().position(|id| id == "lead").unwrap();
        let root_idx = seen.iter().position(|id| id == "root").unwrap();
        assert!(w1_idx < lead_idx);
        assert!(w2_idx < lead_idx);
        assert!(lead_idx < root_idx);
    }

    #[tokio::test]
    async fn root_facts_reflect_propagated_children() {
        let mut tree = sample_tree();
        let grove = Grove::new();
        let runner = EchoRunner;
        let result = grove.execute(&mut tree, &runner, "task").await.unwrap();
        assert!(result.facts.contains_key("coordinator.analysis"));
        assert_eq!(result.agents_run, 4);
    }

    #[cfg(feature = "parallel-siblings")]
    #[tokio::test]
    async fn execute_concurrent_matches_sequential_fact_set() {
        let mut tree = sample_tree();
        let grove = Grove::new();
        let runner: std::sync::Arc<dyn AgentRunner> = std::sync::Arc::new(EchoRunner);
        let result = grove
            .execute_concurrent(&mut tree, runner, "task")
            .await
            .unwrap();
        assert_eq!(result.agents_run, 4);
        assert!(result.facts.contains_key("coordinator.analysis"));
        assert_eq!(tree.get_root().unwrap().agent_id, "root");
    }
}
