//! Phase execution: sequential phases, concurrent calls within a phase.
//!
//! Each phase spawns one task per call into a [`JoinSet`]; before doing any
//! work a task takes a permit from a semaphore sized to the configured
//! concurrency, so no more than that many dispatches are ever in flight.
//! A failed tool call becomes an `ERROR:` result in its slot without
//! cancelling siblings. An infrastructural failure (panic, runtime abort)
//! fails the turn, and dropping the `JoinSet` aborts whatever is still
//! running.
//!
//! Results land in a buffer slot keyed by the call's original batch index,
//! so the model sees them in emission order no matter how completion
//! interleaved.
//!
//! A schedule marked sequential (the planner's cycle fallback) skips the
//! task pool entirely and awaits each call in emission order.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::planner::Schedule;
use crate::toolcall::ToolCall;
use crate::tools::Dispatch;

/// One completed tool call: the model-assigned call id and textual output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub id: String,
    pub text: String,
}

/// Ordered result buffer, one slot per call in emission order.
struct ResultSlots {
    slots: Vec<Option<ToolResult>>,
}

impl ResultSlots {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
        }
    }

    fn set(&mut self, index: usize, result: ToolResult) {
        self.slots[index] = Some(result);
    }

    fn into_ordered(self) -> Result<Vec<ToolResult>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| Error::TaskJoin(format!("missing result for call {index}")))
            })
            .collect()
    }
}

async fn dispatch_to_text(dispatcher: &dyn Dispatch, call: &ToolCall) -> String {
    match dispatcher.dispatch(&call.name, &call.args).await {
        Ok(output) => output,
        Err(err) => format!("ERROR: {err}"),
    }
}

/// Run the schedule against `dispatcher` and return one result per call, in
/// emission order.
pub async fn run_phases(
    dispatcher: Arc<dyn Dispatch>,
    calls: &[ToolCall],
    schedule: &Schedule,
    concurrency: usize,
) -> Result<Vec<ToolResult>> {
    let mut results = ResultSlots::new(calls.len());

    // The planner's cycle fallback promises emission order, which a task
    // pool cannot: run its single layer one call at a time.
    if schedule.sequential {
        for layer in &schedule.layers {
            for &index in layer {
                let call = &calls[index];
                let text = dispatch_to_text(dispatcher.as_ref(), call).await;
                results.set(
                    index,
                    ToolResult {
                        id: call.id.clone(),
                        text,
                    },
                );
            }
        }
        return results.into_ordered();
    }

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    for (phase, layer) in schedule.layers.iter().enumerate() {
        debug!(phase, calls = layer.len(), "starting phase");
        let mut tasks: JoinSet<Result<(usize, ToolResult)>> = JoinSet::new();
        for &index in layer {
            let call = calls[index].clone();
            let dispatcher = Arc::clone(&dispatcher);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|err| Error::TaskJoin(err.to_string()))?;
                let text = dispatch_to_text(dispatcher.as_ref(), &call).await;
                Ok((index, ToolResult { id: call.id, text }))
            });
        }
        // The phase is a barrier: every call finishes before the next phase
        // starts. An early return here drops the JoinSet and aborts the rest.
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|err| Error::TaskJoin(err.to_string()))??;
            results.set(index, result);
        }
    }

    results.into_ordered()
}
