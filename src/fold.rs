//! Content-addressed storage of message groups + recall.
//!
//! Grounded on `fold.py`'s `FoldEngine`. `foldId`s are 16 hex chars "from a
//! secure random" per spec.md §9; `rand`'s OS-backed thread RNG satisfies
//! that without pulling in `uuid` the way the teacher's checkpoint code
//! does (see DESIGN.md for the drop).

use std::collections::HashMap;

use rand::{Rng, RngCore};

use crate::minifier::to_minified_string;
use crate::model::{FoldStatement, Message};

pub struct FoldEngine {
    folds: HashMap<String, Vec<Message>>,
    rng: Box<dyn RngCore + Send>,
}

impl FoldEngine {
    pub fn new() -> Self {
        FoldEngine {
            folds: HashMap::new(),
            rng: Box::new(rand::thread_rng()),
        }
    }

    /// Inject a specific RNG — used by tests that need deterministic fold ids.
    pub fn new_with_rng(rng: Box<dyn RngCore + Send>) -> Self {
        FoldEngine {
            folds: HashMap::new(),
            rng,
        }
    }

    pub fn fold(
        &mut self,
        messages: Vec<Message>,
        summary: impl Into<String>,
        state: Option<indexmap::IndexMap<String, crate::model::Value>>,
    ) -> FoldStatement {
        let fold_id = self.generate_fold_id();
        self.folds.insert(fold_id.clone(), messages);
        FoldStatement {
            fold_id,
            summary: summary.into(),
            state,
        }
    }

    pub fn unfold(&self, fold_id: &str) -> Option<Vec<Message>> {
        self.folds.get(fold_id).cloned()
    }

    pub fn has_fold(&self, fold_id: &str) -> bool {
        self.folds.contains_key(fold_id)
    }

    pub fn get_fold_count(&self) -> usize {
        self.folds.len()
    }

    pub fn clear(&mut self) {
        self.folds.clear();
    }

    /// True when the summed minified-token counts of `messages` reach
    /// `budget * threshold`.
    pub fn detect_pressure(messages: &[Message], budget: usize, threshold: f64) -> bool {
        let total_tokens: usize = messages
            .iter()
            .map(|m| approx_tokens(&to_minified_string(m)))
            .sum();
        (total_tokens as f64) >= (budget as f64) * threshold
    }

    fn generate_fold_id(&mut self) -> String {
        loop {
            let id: String = (0..16)
                .map(|_| {
                    let nibble = self.rng.gen_range(0..16u8);
                    std::char::from_digit(nibble as u32, 16).unwrap()
                })
                .collect();
            if !self.folds.contains_key(&id) {
                return id;
            }
        }
    }
}

impl Default for FoldEngine {
    fn default() -> Self {
        FoldEngine::new()
    }
}

fn approx_tokens(s: &str) -> usize {
    (s.len() + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Header;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_message() -> Message {
        Message::new(Header::new(1, "m1", "a", "b", 0), Vec::new())
    }

    #[test]
    fn fold_and_unfold_round_trip() {
        let mut engine = FoldEngine::new_with_rng(Box::new(StdRng::seed_from_u64(7)));
        let messages = vec![sample_message()];
        let stmt = engine.fold(messages.clone(), "summary text", None);
        assert_eq!(stmt.fold_id.len(), 16);
        assert!(engine.has_fold(&stmt.fold_id));
        assert_eq!(engine.unfold(&stmt.fold_id), Some(messages));
        assert_eq!(engine.get_fold_count(), 1);
    }

    #[test]
    fn clear_removes_all_folds() {
        let mut engine = FoldEngine::new_with_rng(Box::new(StdRng::seed_from_u64(1)));
        engine.fold(vec![sample_message()], "s", None);
        engine.clear();
        assert_eq!(engine.get_fold_count(), 0);
    }

    #[test]
    fn detect_pressure_threshold() {
        let messages = vec![sample_message(), sample_message()];
        assert!(FoldEngine::detect_pressure(&messages, 1, 0.01));
        assert!(!FoldEngine::detect_pressure(&messages, 10_000, 1.0));
    }
}
