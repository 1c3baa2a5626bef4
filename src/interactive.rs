//! Step-wise grove execution, inspection/editing, checkpoint/rollback, and
//! the post-grove `ChatSession` collaborator.
//!
//! Grounded on `grove.py`'s `InteractiveGrove`/`ChatSession` — both live in
//! this module since they share the same step/checkpoint machinery, the
//! same way the original keeps them in one file.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use crate::checkpoint::CheckpointManager;
use crate::error::{Error, StateError, TopologyError};
use crate::grove::{build_propagation_message, AgentRunner, GroveResult};
use crate::minifier::to_minified_string;
use crate::model::{Message, Statement, Value};
use crate::parser::parse_message;
use crate::tree::TreeEngine;

#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub level: usize,
    pub total_levels: usize,
    pub agents_run: usize,
    pub facts_produced: IndexMap<String, Value>,
    pub messages: Vec<Message>,
    pub is_complete: bool,
}

pub struct InteractiveGrove<'a> {
    tree: TreeEngine,
    runner: &'a dyn AgentRunner,
    checkpoint_mgr: Option<CheckpointManager>,
    task: String,
    levels: Vec<Vec<String>>,
    message_log: Vec<Message>,
    current_level: usize,
    agents_run: usize,
    setup_done: bool,
}

impl<'a> InteractiveGrove<'a> {
    pub fn new(tree: TreeEngine, runner: &'a dyn AgentRunner) -> Self {
        InteractiveGrove {
            tree,
            runner,
            checkpoint_mgr: None,
            task: String::new(),
            levels: Vec::new(),
            message_log: Vec::new(),
            current_level: 0,
            agents_run: 0,
            setup_done: false,
        }
    }

    #[must_use]
    pub fn with_checkpoint_manager(mut self, mgr: CheckpointManager) -> Self {
        self.checkpoint_mgr = Some(mgr);
        self
    }

    pub fn setup(&mut self, task: impl Into<String>) {
        self.task = task.into();
        self.tree.setup_subscriptions("**");
        self.levels = self.tree.get_levels_bottom_up();
        self.message_log.clear();
        self.current_level = 0;
        self.agents_run = 0;
        self.setup_done = true;
    }

    pub async fn step(&mut self) -> Result<StepResult, Error> {
        if !self.setup_done {
            return Err(Error::State(StateError::StepBeforeSetup));
        }
        if self.current_level >= self.levels.len() {
            return Err(Error::State(StateError::StepAfterComplete));
        }

        let level = self.levels[self.current_level].clone();
        let mut facts_produced = IndexMap::new();
        let mut step_messages = Vec::new();

        for node_id in &level {
            let child_ids = self
                .tree
                .get_node(node_id)
                .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(node_id.clone())))?
                .children
                .clone();
            let mut child_facts = IndexMap::new();
            for child_id in &child_ids {
                if let Some(child) = self.tree.get_node(child_id) {
                    for (topic, (value, _)) in child.knowledge.get_all_facts() {
                        child_facts.insert(topic.clone(), value.to_string());
                    }
                }
            }

            {
                let node = self
                    .tree
                    .get_node_mut(node_id)
                    .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(node_id.clone())))?;
                self.runner.run(node, &self.task, &child_facts).await;
            }
            self.agents_run += 1;

            let is_root = self.tree.get_node(node_id).expect("node exists").parent.is_none();
            if !is_root {
                let accepted = self.tree.propagate_up(node_id)?;
                if !accepted.is_empty() {
                    let parent_id = self
                        .tree
                        .get_node(node_id)
                        .expect("node exists")
                        .parent
                        .clone()
                        .expect("non-root has parent");
                    let message = {
                        let child = self.tree.get_node_mut(node_id).expect("node exists");
                        build_propagation_message(
                            &mut child.correlation,
                            node_id,
                            &parent_id,
                            accepted.into_iter().map(Statement::Knowledge).collect(),
                        )
                    };
                    self.tree
                        .get_node_mut(&parent_id)
                        .expect("parent exists")
                        .correlation
                        .record_incoming(&message);
                    step_messages.push(message.clone());
                    self.message_log.push(message);
                }
            }

            if let Some(node) = self.tree.get_node(node_id) {
                for (topic, (value, _)) in node.knowledge.get_all_facts() {
                    facts_produced.insert(topic.clone(), value.clone());
                }
            }
        }

        self.current_level += 1;
        let is_complete = self.current_level >= self.levels.len();

        Ok(StepResult {
            level: self.current_level - 1,
            total_levels: self.levels.len(),
            agents_run: self.agents_run,
            facts_produced,
            messages: step_messages,
            is_complete,
        })
    }

    pub async fn complete(&mut self) -> Result<GroveResult, Error> {
        while self.current_level < self.levels.len() {
            self.step().await?;
        }
        self.result()
    }

    pub fn result(&self) -> Result<GroveResult, Error> {
        let root = self.tree.get_root()?;
        let facts: IndexMap<String, Value> = root
            .knowledge
            .get_all_facts()
            .iter()
            .map(|(topic, (value, _))| (topic.clone(), value.clone()))
            .collect();
        Ok(GroveResult {
            facts,
            messages: self.message_log.clone(),
            agents_run: self.agents_run,
            levels_processed: self.levels.len(),
        })
    }

    pub fn inspect_node(&self, agent_id: &str) -> Result<&IndexMap<String, (Value, i64)>, Error> {
        Ok(self
            .tree
            .get_node(agent_id)
            .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(agent_id.to_string())))?
            .knowledge
            .get_all_facts())
    }

    pub fn edit_fact(&mut self, agent_id: &str, topic: impl Into<String>, value: Value) -> Result<(), Error> {
        let node = self
            .tree
            .get_node_mut(agent_id)
            .ok_or_else(|| Error::Topology(TopologyError::UnknownNode(agent_id.to_string())))?;
        node.knowledge.assert_fact(topic, value);
        Ok(())
    }

    pub async fn checkpoint(&self) -> Result<String, Error> {
        let mgr = self
            .checkpoint_mgr
            .as_ref()
            .ok_or(Error::State(StateError::NoCheckpointManager))?;
        let messages: Vec<String> = self.message_log.iter().map(to_minified_string).collect();
        let meta = mgr
            .save(
                &self.tree,
                &self.task,
                &messages,
                self.agents_run,
                self.current_level,
                self.levels.len(),
                now_seconds(),
            )
            .await?;
        Ok(meta.checkpoint_id)
    }

    pub async fn rollback(&mut self, checkpoint_id: &str) -> Result<(), Error> {
        let mgr = self
            .checkpoint_mgr
            .as_ref()
            .ok_or(Error::State(StateError::NoCheckpointManager))?;
        let meta = mgr.load(checkpoint_id).await?;
        mgr.restore(&meta, &mut self.tree);
        self.current_level = meta.current_level;
        self.agents_run = meta.agents_run;
        self.message_log = meta
            .messages
            .iter()
            .filter_map(|raw| parse_message(raw).ok())
            .collect();
        Ok(())
    }

    pub async fn list_checkpoints(&self) -> Result<Vec<crate::checkpoint::CheckpointMeta>, Error> {
        let mgr = self
            .checkpoint_mgr
            .as_ref()
            .ok_or(Error::State(StateError::NoCheckpointManager))?;
        mgr.list_checkpoints().await
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub reply: String,
    pub facts_updated: IndexMap<String, Value>,
    pub message: Option<Message>,
}

/// A thin post-grove collaborator: repeatedly feeds user text plus the
/// root's current facts to the runner on the root node.
pub struct ChatSession<'a> {
    tree: TreeEngine,
    runner: &'a dyn AgentRunner,
    checkpoint_mgr: Option<CheckpointManager>,
    grove_result: GroveResult,
    history: Vec<(String, String)>,
}

impl<'a> ChatSession<'a> {
    pub fn new(grove_result: GroveResult, tree: TreeEngine, runner: &'a dyn AgentRunner) -> Self {
        ChatSession {
            tree,
            runner,
            checkpoint_mgr: None,
            grove_result,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_checkpoint_manager(mut self, mgr: CheckpointManager) -> Self {
        self.checkpoint_mgr = Some(mgr);
        self
    }

    pub async fn chat(&mut self, user_message: &str) -> Result<ChatResponse, Error> {
        let root_id = self.tree.get_root()?.agent_id.clone();

        let mut feedback_facts = IndexMap::new();
        if let Some(root) = self.tree.get_node(&root_id) {
            for (topic, (value, _)) in root.knowledge.get_all_facts() {
                feedback_facts.insert(topic.clone(), value.to_string());
            }
        }
        feedback_facts.insert("user.feedback".to_string(), user_message.to_string());
        if !self.history.is_empty() {
            let recent: Vec<String> = self
                .history
                .iter()
                .rev()
                .take(3)
                .rev()
                .map(|(u, r)| format!("user: {u}\nassistant: {r}"))
                .collect();
            feedback_facts.insert("chat.history".to_string(), recent.join("\n"));
        }

        let before: IndexMap<String, (Value, i64)> = self
            .tree
            .get_node(&root_id)
            .expect("root exists")
            .knowledge
            .get_all_facts()
            .clone();

        {
            let root = self
                .tree
                .get_node_mut(&root_id)
                .expect("root exists");
            self.runner.run(root, user_message, &feedback_facts).await;
        }

        let mut facts_updated = IndexMap::new();
        let root = self.tree.get_node(&root_id).expect("root exists");
        for (topic, (value, version)) in root.knowledge.get_all_facts() {
            if before.get(topic).map(|(_, v)| v) != Some(version) {
                facts_updated.insert(topic.clone(), value.clone());
            }
        }

        let message = if facts_updated.is_empty() {
            None
        } else {
            let version = root.knowledge.get_local_version();
            let statements: Vec<Statement> = facts_updated
                .iter()
                .map(|(topic, value)| {
                    Statement::Knowledge(crate::model::KnowledgeStatement {
                        topic: topic.clone(),
                        value: value.clone(),
                        version,
                    })
                })
                .collect();
            let header = {
                let root = self.tree.get_node_mut(&root_id).expect("root exists");
                root.correlation
                    .create_response_header(root_id.clone(), "user", now_seconds())
            };
            Some(Message::new(header, statements))
        };

        let reply = if facts_updated.is_empty() {
            "(no facts produced)".to_string()
        } else {
            facts_updated
                .iter()
                .map(|(topic, value)| format!("{topic}: {value}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        self.history.push((user_message.to_string(), reply.clone()));

        Ok(ChatResponse {
            reply,
            facts_updated,
            message,
        })
    }

    pub async fn checkpoint(&self) -> Result<String, Error> {
        let mgr = self
            .checkpoint_mgr
            .as_ref()
            .ok_or(Error::State(StateError::NoCheckpointManager))?;
        let messages: Vec<String> = Vec::new();
        let meta = mgr
            .save(
                &self.tree,
                "chat-session",
                &messages,
                self.grove_result.agents_run,
                self.grove_result.levels_processed,
                self.grove_result.levels_processed,
                now_seconds(),
            )
            .await?;
        Ok(meta.checkpoint_id)
    }

    pub async fn rollback(&mut self, checkpoint_id: &str) -> Result<(), Error> {
        let mgr = self
            .checkpoint_mgr
            .as_ref()
            .ok_or(Error::State(StateError::NoCheckpointManager))?;
        let meta = mgr.load(checkpoint_id).await?;
        mgr.restore(&meta, &mut self.tree);
        Ok(())
    }
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grove::EchoRunner;
    use crate::tree::TreeEngine;

    fn sample_tree() -> TreeEngine {
        let mut tree = TreeEngine::new();
        tree.add_root("root", "coordinator").unwrap();
        tree.add_child("root", "lead", "lead").unwrap();
        tree.add_child("lead", "w1", "worker").unwrap();
        tree.add_child("lead", "w2", "worker").unwrap();
        tree
    }

    #[tokio::test]
    async fn step_before_setup_errors() {
        let tree = sample_tree();
        let runner = EchoRunner;
        let mut grove = InteractiveGrove::new(tree, &runner);
        let err = grove.step().await.unwrap_err();
        assert_eq!(err.to_string(), Error::State(StateError::StepBeforeSetup).to_string());
    }

    #[tokio::test]
    async fn step_after_complete_errors() {
        let tree = sample_tree();
        let runner = EchoRunner;
        let mut grove = InteractiveGrove::new(tree, &runner);
        grove.setup("task");
        while grove.step().await.is_ok() {}
        let err = grove.step().await.unwrap_err();
        assert_eq!(err.to_string(), Error::State(StateError::StepAfterComplete).to_string());
    }

    #[tokio::test]
    async fn complete_runs_every_level() {
        let tree = sample_tree();
        let runner = EchoRunner;
        let mut grove = InteractiveGrove::new(tree, &runner);
        grove.setup("task");
        let result = grove.complete().await.unwrap();
        assert_eq!(result.agents_run, 4);
    }

    #[tokio::test]
    async fn edit_fact_bumps_version() {
        let tree = sample_tree();
        let runner = EchoRunner;
        let mut grove = InteractiveGrove::new(tree, &runner);
        grove.setup("task");
        grove.edit_fact("w1", "manual.note", Value::String("hi".into())).unwrap();
        let facts = grove.inspect_node("w1").unwrap();
        assert_eq!(facts.get("manual.note").unwrap().1, 1);
    }

    #[tokio::test]
    async fn inspect_unknown_node_errors() {
        let tree = sample_tree();
        let runner = EchoRunner;
        let grove = InteractiveGrove::new(tree, &runner);
        assert!(grove.inspect_node("ghost").is_err());
    }
}
