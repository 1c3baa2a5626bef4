//! Agent topology: id-indexed node map, single root, bottom-up levels.
//!
//! Grounded on `tree.py`'s `AgentNode`/`TreeEngine`. Children hold no
//! owning reference to their parent — `parent` is an id resolved through
//! the tree's own map, avoiding reference cycles without a GC.

use indexmap::IndexMap;

use crate::correlation::CorrelationEngine;
use crate::error::TopologyError;
use crate::knowledge::KnowledgeEngine;
use crate::model::{KnowledgeStatement, Value};

pub struct AgentNode {
    pub agent_id: String,
    pub role: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub knowledge: KnowledgeEngine,
    pub correlation: CorrelationEngine,
    pub metadata: IndexMap<String, Value>,
}

impl AgentNode {
    fn new(agent_id: impl Into<String>, role: impl Into<String>, parent: Option<String>) -> Self {
        let agent_id = agent_id.into();
        AgentNode {
            correlation: CorrelationEngine::new(agent_id.clone()),
            knowledge: KnowledgeEngine::new(agent_id.clone()),
            agent_id,
            role: role.into(),
            parent,
            children: Vec::new(),
            metadata: IndexMap::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Default)]
pub struct TreeEngine {
    nodes: IndexMap<String, AgentNode>,
    root_id: Option<String>,
}

impl TreeEngine {
    pub fn new() -> Self {
        TreeEngine::default()
    }

    pub fn add_root(&mut self, agent_id: impl Into<String>, role: impl Into<String>) -> Result<(), TopologyError> {
        if self.root_id.is_some() {
            return Err(TopologyError::RootAlreadyExists);
        }
        let agent_id = agent_id.into();
        if self.nodes.contains_key(&agent_id) {
            return Err(TopologyError::DuplicateAgentId(agent_id));
        }
        self.root_id = Some(agent_id.clone());
        self.nodes
            .insert(agent_id.clone(), AgentNode::new(agent_id, role, None));
        Ok(())
    }

    pub fn add_child(
        &mut self,
        parent_id: &str,
        agent_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<(), TopologyError> {
        if !self.nodes.contains_key(parent_id) {
            return Err(TopologyError::UnknownParent(parent_id.to_string()));
        }
        let agent_id = agent_id.into();
        if self.nodes.contains_key(&agent_id) {
            return Err(TopologyError::DuplicateAgentId(agent_id));
        }
        self.nodes.insert(
            agent_id.clone(),
            AgentNode::new(agent_id.clone(), role, Some(parent_id.to_string())),
        );
        self.nodes
            .get_mut(parent_id)
            .expect("parent existence checked above")
            .children
            .push(agent_id);
        Ok(())
    }

    pub fn get_node(&self, agent_id: &str) -> Option<&AgentNode> {
        self.nodes.get(agent_id)
    }

    pub fn get_node_mut(&mut self, agent_id: &str) -> Option<&mut AgentNode> {
        self.nodes.get_mut(agent_id)
    }

    pub fn get_root(&self) -> Result<&AgentNode, TopologyError> {
        let root_id = self.root_id.as_ref().ok_or(TopologyError::NoRoot)?;
        Ok(self.nodes.get(root_id).expect("root id always present"))
    }

    pub fn get_leaves(&self) -> Vec<&AgentNode> {
        self.nodes.values().filter(|n| n.is_leaf()).collect()
    }

    pub fn get_all_node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Remove a node from the tree, handing ownership to the caller. Used
    /// by `Grove::execute_concurrent` to give each sibling's agent task
    /// exclusive, lock-free access to its own node while it runs.
    pub fn take_node(&mut self, agent_id: &str) -> Option<AgentNode> {
        self.nodes.shift_remove(agent_id)
    }

    /// Reinsert a node previously removed with [`Self::take_node`].
    pub fn put_node(&mut self, agent_id: String, node: AgentNode) {
        self.nodes.insert(agent_id, node);
    }

    /// Breadth-first depth assignment from the root, grouped by depth then
    /// reversed so the deepest level is first.
    pub fn get_levels_bottom_up(&self) -> Vec<Vec<String>> {
        let Some(root_id) = &self.root_id else {
            return Vec::new();
        };
        let mut depths: Vec<Vec<String>> = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((root_id.clone(), 0usize));
        while let Some((id, depth)) = queue.pop_front() {
            if depths.len() <= depth {
                depths.resize_with(depth + 1, Vec::new);
            }
            depths[depth].push(id.clone());
            if let Some(node) = self.nodes.get(&id) {
                for child in &node.children {
                    queue.push_back((child.clone(), depth + 1));
                }
            }
        }
        depths.reverse();
        depths
    }

    pub fn get_depth(&self) -> usize {
        fn depth_of(nodes: &IndexMap<String, AgentNode>, id: &str) -> usize {
            let node = &nodes[id];
            if node.children.is_empty() {
                0
            } else {
                1 + node
                    .children
                    .iter()
                    .map(|c| depth_of(nodes, c))
                    .max()
                    .unwrap_or(0)
            }
        }
        match &self.root_id {
            Some(root_id) => depth_of(&self.nodes, root_id),
            None => 0,
        }
    }

    /// Each parent subscribes to every child with `pattern` (a parent wants
    /// to read its children's facts, so the subscription is attached to the
    /// child's engine with the parent as subscriber).
    pub fn setup_subscriptions(&mut self, pattern: &str) {
        let edges: Vec<(String, String)> = self
            .nodes
            .values()
            .flat_map(|node| {
                node.children
                    .iter()
                    .map(move |child| (node.agent_id.clone(), child.clone()))
            })
            .collect();
        for (parent_id, child_id) in edges {
            if let Some(child) = self.nodes.get_mut(&child_id) {
                child.knowledge.add_subscriber(parent_id, pattern);
            }
        }
    }

    /// `child.computeDelta(parent) -> parent.applyIncoming(delta, child) ->
    /// child.acknowledgeSync(parent, max(delta.version))`. No-op for root.
    pub fn propagate_up(&mut self, child_id: &str) -> Result<Vec<KnowledgeStatement>, TopologyError> {
        let child = self
            .nodes
            .get(child_id)
            .ok_or_else(|| TopologyError::UnknownNode(child_id.to_string()))?;
        let Some(parent_id) = child.parent.clone() else {
            return Ok(Vec::new());
        };
        let delta = child.knowledge.compute_delta(&parent_id);
        if delta.is_empty() {
            return Ok(Vec::new());
        }

        let accepted = {
            let parent = self
                .nodes
                .get_mut(&parent_id)
                .ok_or_else(|| TopologyError::UnknownNode(parent_id.clone()))?;
            parent.knowledge.apply_incoming(&delta, child_id)
        };

        if let Some(max_version) = delta.iter().map(|s| s.version).max() {
            let child = self
                .nodes
                .get_mut(child_id)
                .ok_or_else(|| TopologyError::UnknownNode(child_id.to_string()))?;
            child.knowledge.acknowledge_sync(parent_id, max_version);
        }

        Ok(accepted)
    }

    pub fn render_ascii(&self) -> String {
        let Some(root_id) = &self.root_id else {
            return String::new();
        };
        let mut out = String::new();
        self.render_node(root_id, "", true, &mut out, true);
        out
    }

    fn render_node(&self, id: &str, prefix: &str, is_last: bool, out: &mut String, is_root: bool) {
        let node = &self.nodes[id];
        if is_root {
            out.push_str(&format!("{} ({})\n", node.agent_id, node.role));
        } else {
            let connector = if is_last { "└── " } else { "├── " };
            out.push_str(&format!("{prefix}{connector}{} ({})\n", node.agent_id, node.role));
        }
        let child_prefix = if is_root {
            String::new()
        } else if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        for (idx, child) in node.children.iter().enumerate() {
            let child_is_last = idx == node.children.len() - 1;
            self.render_node(child, &child_prefix, child_is_last, out, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn sample_tree() -> TreeEngine {
        let mut tree = TreeEngine::new();
        tree.add_root("root", "coordinator").unwrap();
        tree.add_child("root", "lead", "lead").unwrap();
        tree.add_child("lead", "w1", "worker").unwrap();
        tree.add_child("lead", "w2", "worker").unwrap();
        tree
    }

    #[test]
    fn add_root_twice_errors() {
        let mut tree = TreeEngine::new();
        tree.add_root("a", "root").unwrap();
        assert_eq!(tree.add_root("b", "root"), Err(TopologyError::RootAlreadyExists));
    }

    #[test]
    fn add_child_unknown_parent_errors() {
        let mut tree = TreeEngine::new();
        assert_eq!(
            tree.add_child("missing", "x", "role"),
            Err(TopologyError::UnknownParent("missing".to_string()))
        );
    }

    #[test]
    fn levels_bottom_up_has_workers_before_lead_before_root() {
        let tree = sample_tree();
        let levels = tree.get_levels_bottom_up();
        assert_eq!(levels.len(), 3);
        assert!(levels[0].contains(&"w1".to_string()));
        assert!(levels[0].contains(&"w2".to_string()));
        assert_eq!(levels[1], vec!["lead".to_string()]);
        assert_eq!(levels[2], vec!["root".to_string()]);
    }

    #[test]
    fn propagate_up_moves_facts_and_acks_version() {
        let mut tree = sample_tree();
        tree.setup_subscriptions("**");
        tree.get_node_mut("w1")
            .unwrap()
            .knowledge
            .assert_fact("worker.status", Value::String("done".into()));
        let accepted = tree.propagate_up("w1").unwrap();
        assert_eq!(accepted.len(), 1);
        assert!(tree.get_node("lead").unwrap().knowledge.get_fact("worker.status").is_some());
    }

    #[test]
    fn propagate_up_is_noop_for_root() {
        let mut tree = sample_tree();
        assert_eq!(tree.propagate_up("root").unwrap(), Vec::new());
    }

    #[test]
    fn propagate_up_acks_the_sent_version_even_when_parent_rejects_it() {
        // The parent already holds an equal-or-higher version of the same
        // topic, so `apply_incoming` accepts nothing. The child must still
        // advance its sync watermark to what it sent, or it re-sends the
        // same fact on every later propagation.
        let mut tree = sample_tree();
        tree.setup_subscriptions("**");
        tree.get_node_mut("lead")
            .unwrap()
            .knowledge
            .assert_fact("worker.status", Value::String("preset".into()));
        tree.get_node_mut("w1")
            .unwrap()
            .knowledge
            .assert_fact("worker.status", Value::String("done".into()));

        let accepted = tree.propagate_up("w1").unwrap();
        assert!(accepted.is_empty());

        let w1_delta_after = tree.get_node("w1").unwrap().knowledge.compute_delta("lead");
        assert!(
            w1_delta_after.is_empty(),
            "rejected fact must not be re-emitted on the next delta"
        );
    }
}
