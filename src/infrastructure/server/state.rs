use crate::lifecycle::AgentRuntime;
use crate::model::ModelProvider;
use std::sync::Arc;

pub(crate) struct ServerState<P: ModelProvider> {
    runtime: Arc<AgentRuntime<P>>,
}

impl<P: ModelProvider> ServerState<P> {
    pub(crate) fn new(runtime: Arc<AgentRuntime<P>>) -> Self {
        Self { runtime }
    }

    pub(crate) fn runtime(&self) -> Arc<AgentRuntime<P>> {
        Arc::clone(&self.runtime)
    }
}
