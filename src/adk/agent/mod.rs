// SPDX-License-Identifier: MIT

//! Agent module - defines agent types for content workflows
//!
//! An agent is a model bound to a role constraint (its instruction).
//! - `LLMAgent` - single-turn instruction-following agent

mod llm;

pub use llm::LLMAgent;

use crate::adk::error::ForgeError;
use async_trait::async_trait;

/// Core agent trait for all agent types
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent name
    fn name(&self) -> &str;

    /// Run the agent with the given input
    async fn run(&self, input: String) -> Result<String, ForgeError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A simple mock agent that transforms input (used in tests)
    pub struct MockAgent {
        name: String,
        transform: fn(String) -> String,
    }

    impl MockAgent {
        pub fn new(name: &str, transform: fn(String) -> String) -> Self {
            Self {
                name: name.to_string(),
                transform,
            }
        }
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, input: String) -> Result<String, ForgeError> {
            Ok((self.transform)(input))
        }
    }

    /// Agent that replays a fixed script of replies and records its inputs.
    /// `Err` entries become API errors. The last entry repeats once the
    /// script is exhausted.
    pub struct ScriptedAgent {
        name: String,
        replies: Mutex<VecDeque<Result<String, String>>>,
        last: Mutex<Option<Result<String, String>>>,
        pub inputs: Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        pub fn new(name: &str, replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                name: name.to_string(),
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                last: Mutex::new(None),
                inputs: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, input: String) -> Result<String, ForgeError> {
            self.inputs.lock().unwrap().push(input);
            let next = self.replies.lock().unwrap().pop_front();
            let reply = match next {
                Some(r) => {
                    *self.last.lock().unwrap() = Some(r.clone());
                    r
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Err("script exhausted".to_string())),
            };
            reply.map_err(|e| ForgeError::api(self.name.clone(), e))
        }
    }

    #[tokio::test]
    async fn test_scripted_agent_repeats_last() {
        let agent = ScriptedAgent::new("s", vec![Ok("one"), Err("down")]);
        assert_eq!(agent.run("a".to_string()).await.unwrap(), "one");
        assert!(agent.run("b".to_string()).await.is_err());
        assert!(agent.run("c".to_string()).await.is_err());
        assert_eq!(agent.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_agent() {
        let agent = MockAgent::new("test", |s| format!("{}-transformed", s));
        assert_eq!(agent.name(), "test");

        let result = agent.run("input".to_string()).await.unwrap();
        assert_eq!(result, "input-transformed");
    }
}
