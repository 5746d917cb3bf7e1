use std::sync::Arc;

use cw_store::Store;

/// Pure-ish component: reads active [`cw_store::SteeringCorrection`] rows
/// and formats them into a text block appended to agent prompts, grouped
/// by domain. No side effects; safe to call on every spawn.
pub struct SteeringEngine {
    store: Arc<Store>,
}

impl SteeringEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// `buildPromptBlock(projectId)`: active corrections scoped to the
    /// project or global, grouped by domain, rendered as a text block.
    /// Returns an empty string (not an error) when no corrections apply —
    /// an empty steering block is a no-op when concatenated into a prompt.
    pub fn build_prompt_block(&self, project_id: &str) -> Result<String, cw_store::StoreError> {
        let corrections = self.store.list_active_corrections(project_id)?;
        if corrections.is_empty() {
            return Ok(String::new());
        }

        let mut out = String::new();
        let mut current_domain = String::new();
        for correction in &corrections {
            if correction.domain != current_domain {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("## Steering: {}\n", correction.domain));
                current_domain = correction.domain.clone();
            }
            out.push_str("- ");
            out.push_str(correction.text.trim());
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_corrections() -> (Arc<Store>, String) {
        let store = Store::open_in_memory(&"e".repeat(64)).unwrap();
        let project = store.create_project("demo", "", None, 30).unwrap();
        store
            .insert_steering_correction(Some(&project.id), "testing", "always run the test suite before committing")
            .unwrap();
        store
            .insert_steering_correction(None, "testing", "prefer integration tests over mocks")
            .unwrap();
        store
            .insert_steering_correction(Some(&project.id), "style", "no trailing whitespace")
            .unwrap();
        (Arc::new(store), project.id)
    }

    #[test]
    fn build_prompt_block_groups_by_domain() {
        let (store, project_id) = store_with_corrections();
        let engine = SteeringEngine::new(store);
        let block = engine.build_prompt_block(&project_id).unwrap();
        assert!(block.contains("## Steering: testing"));
        assert!(block.contains("## Steering: style"));
        assert!(block.contains("always run the test suite"));
    }

    #[test]
    fn build_prompt_block_empty_when_no_corrections() {
        let store = Arc::new(Store::open_in_memory(&"f".repeat(64)).unwrap());
        let project = store.create_project("demo", "", None, 30).unwrap();
        let engine = SteeringEngine::new(store);
        let block = engine.build_prompt_block(&project.id).unwrap();
        assert!(block.is_empty());
    }
}
