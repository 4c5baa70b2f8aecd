//! Input node: hands a user-supplied value to the rest of the graph.

use crate::agents::{EventStream, NodeAgent, RunContext};
use crate::error::EngineError;
use crate::events::ExecutionEvent;
use crate::session::{user_input_key, Session};
use async_stream::try_stream;
use futures::StreamExt;

/// Reads `__user_input__<id>` from the session and republishes it under the
/// node's own id.
pub struct InputAgent {
    id: String,
}

impl InputAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl NodeAgent for InputAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<'a>(&'a self, _ctx: &'a RunContext, session: &'a Session) -> EventStream<'a> {
        try_stream! {
            yield ExecutionEvent::node_started(&self.id);

            let value = session
                .get(&user_input_key(&self.id))
                .ok_or_else(|| EngineError::MissingInput(self.id.clone()))?;

            session.set(&self.id, value.clone());
            yield ExecutionEvent::node_completed(&self.id, value);
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::HashMap;

    async fn drain(
        agent: &InputAgent,
        session: &Session,
    ) -> Vec<crate::error::Result<ExecutionEvent>> {
        let ctx = RunContext::default();
        agent.run(&ctx, session).collect().await
    }

    #[tokio::test]
    async fn test_consumes_user_input() {
        let mut inputs = HashMap::new();
        inputs.insert("in".to_string(), json!("hello"));
        let session = Session::with_user_inputs(&inputs);

        let agent = InputAgent::new("in");
        let events = drain(&agent, &session).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().kind(), "node_started");
        match events[1].as_ref().unwrap() {
            ExecutionEvent::NodeCompleted { output, .. } => assert_eq!(output, &json!("hello")),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.get("in"), Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let session = Session::new();
        let agent = InputAgent::new("in");
        let events = drain(&agent, &session).await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        match events[1].as_ref().unwrap_err() {
            EngineError::MissingInput(id) => assert_eq!(id, "in"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
