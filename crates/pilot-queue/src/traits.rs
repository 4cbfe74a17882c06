//! Seams the queue worker calls out to after a Runner invocation settles.
//! Metering and the learning loop are separate crates; the worker only
//! needs to know it can hand them an execution and its result.

use async_trait::async_trait;
use pilot_types::{Execution, ExecutionResult};

#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record_task_usage(&self, execution: &Execution, result: &ExecutionResult);
}

#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    async fn record_execution(&self, execution: &Execution, result: &ExecutionResult);
}
