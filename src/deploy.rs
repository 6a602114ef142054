use std::collections::BTreeMap;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Output, Stack, StackStatus};
use aws_sdk_cloudformation::Client;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::stack::{SynthesizedStack, TemplateFormat};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

fn sdk_error<E: std::error::Error>(e: E) -> String {
    format!("{}", DisplayErrorContext(&e))
}

/// The id of the live stack called `name`, if there is one. Ids keep
/// resolving after the stack is deleted, names do not.
pub async fn existing_stack_id(client: &Client, name: &str) -> Result<Option<String>> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(out) => Ok(out.stacks().first().and_then(|s| s.stack_id()).map(str::to_string)),
        Err(e) => {
            let e_str = sdk_error(e);
            if e_str.contains("does not exist") {
                return Ok(None);
            }
            Err(Error::Aws(e_str))
        }
    }
}

/// What was asked of CloudFormation, which decides what counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Where a stack is, as far as waiting on it is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Complete,
    InProgress,
    Failed,
}

pub fn classify_status(op: Operation, status: &StackStatus) -> StatusKind {
    match status {
        // a create that failed is deleted again (OnFailure::Delete)
        StackStatus::DeleteComplete if op == Operation::Delete => StatusKind::Complete,
        StackStatus::DeleteComplete => StatusKind::Failed,

        StackStatus::CreateComplete | StackStatus::UpdateComplete | StackStatus::ImportComplete
            if op != Operation::Delete =>
        {
            StatusKind::Complete
        }

        StackStatus::CreateInProgress
        | StackStatus::DeleteInProgress
        | StackStatus::ImportInProgress
        | StackStatus::ImportRollbackInProgress
        | StackStatus::ReviewInProgress
        | StackStatus::RollbackInProgress
        | StackStatus::UpdateCompleteCleanupInProgress
        | StackStatus::UpdateInProgress
        | StackStatus::UpdateRollbackCompleteCleanupInProgress
        | StackStatus::UpdateRollbackInProgress => StatusKind::InProgress,

        // a finished rollback still means the change we asked for did not happen
        _ => StatusKind::Failed,
    }
}

/// Picks the root cause out of stack events listed newest first, as
/// `(logical id, status, reason)`. That is the oldest resource failure after
/// the user initiated event that started the latest operation.
pub fn failure_reason<'a>(
    stack_name: &str,
    events: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
) -> Option<String> {
    let mut first_failure = None;
    for (logical_id, status, reason) in events {
        if logical_id == stack_name {
            if reason == "User Initiated" {
                break;
            }
            continue;
        }
        if status.ends_with("_FAILED") {
            first_failure = Some(format!("{logical_id} {status}: {reason}"));
        }
    }
    first_failure
}

async fn stack_failure_reason(client: &Client, stack: &Stack) -> String {
    let id = stack.stack_id().unwrap_or_default();
    let name = stack.stack_name().unwrap_or_default();
    let status = stack.stack_status().map(|s| s.as_str()).unwrap_or("UNKNOWN");
    let from_events = match client.describe_stack_events().stack_name(id).send().await {
        Ok(out) => failure_reason(
            name,
            out.stack_events().iter().map(|e| {
                (
                    e.logical_resource_id().unwrap_or_default(),
                    e.resource_status().map(|s| s.as_str()).unwrap_or_default(),
                    e.resource_status_reason().unwrap_or_default(),
                )
            }),
        ),
        Err(e) => {
            warn!(stack = name, error = %sdk_error(e), "failed to read stack events");
            None
        }
    };
    let reason = from_events
        .or_else(|| stack.stack_status_reason().map(str::to_string))
        .unwrap_or_else(|| "Failed to get stack failure reason".to_string());
    format!("{status}: {reason}")
}

/// `Ok(None)` while the stack is still in progress. `stack` may be a name
/// or a stack id; only an id can be described once the stack is deleted.
pub async fn describe_stack(client: &Client, stack: &str, op: Operation) -> Result<Option<Stack>> {
    let out = client
        .describe_stacks()
        .stack_name(stack)
        .send()
        .await
        .map_err(|e| Error::Aws(sdk_error(e)))?;
    let described = out
        .stacks()
        .first()
        .ok_or_else(|| Error::StackFailed { stack: stack.to_string(), reason: format!("Stack {stack} not found") })?;
    let name = described.stack_name().unwrap_or(stack);
    let status = described
        .stack_status()
        .ok_or_else(|| Error::StackFailed { stack: name.to_string(), reason: format!("Stack {name} has no status") })?;
    debug!(stack = name, status = status.as_str(), "stack status");
    match classify_status(op, status) {
        StatusKind::Complete => Ok(Some(described.clone())),
        StatusKind::InProgress => Ok(None),
        StatusKind::Failed => Err(Error::StackFailed {
            stack: name.to_string(),
            reason: stack_failure_reason(client, described).await,
        }),
    }
}

pub fn stack_outputs(outputs: &[Output]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for output in outputs {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

pub async fn wait_for_output(
    client: &Client,
    stack_id: &str,
    op: Operation,
    poll_interval: Duration,
) -> Result<BTreeMap<String, String>> {
    loop {
        tokio::time::sleep(poll_interval).await;
        match describe_stack(client, stack_id, op).await? {
            Some(stack) => {
                info!(stack = stack.stack_name().unwrap_or(stack_id), "stack is complete");
                return Ok(stack_outputs(stack.outputs()));
            }
            None => debug!(stack = stack_id, "still waiting"),
        }
    }
}

/// A create or update CloudFormation accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackChange {
    pub operation: Operation,
    pub stack_id: String,
}

/// Returns `None` if CloudFormation reported that the template is already
/// deployed as is.
pub async fn create_or_update_stack(client: &Client, stack: &SynthesizedStack) -> Result<Option<StackChange>> {
    let name = stack.stack_name.as_str();
    // pretty so it reads well in the CloudFormation console
    let body = stack.render(TemplateFormat::Json)?;
    let change = match existing_stack_id(client, name).await? {
        Some(existing_id) => {
            info!(stack = name, "updating stack");
            let out = client
                .update_stack()
                .capabilities(Capability::CapabilityNamedIam)
                .capabilities(Capability::CapabilityIam)
                .stack_name(&existing_id)
                .template_body(body)
                .send()
                .await;
            match out {
                Ok(out) => StackChange {
                    operation: Operation::Update,
                    stack_id: out.stack_id().map(str::to_string).unwrap_or(existing_id),
                },
                Err(e) => {
                    let e_str = sdk_error(e);
                    if e_str.contains("No updates are to be performed") {
                        info!(stack = name, "no changes to deploy");
                        return Ok(None);
                    }
                    return Err(Error::Aws(e_str));
                }
            }
        }
        None => {
            info!(stack = name, "creating stack");
            let out = client
                .create_stack()
                .on_failure(OnFailure::Delete)
                .capabilities(Capability::CapabilityNamedIam)
                .capabilities(Capability::CapabilityIam)
                .stack_name(name)
                .template_body(body)
                .send()
                .await
                .map_err(|e| Error::Aws(sdk_error(e)))?;
            let stack_id = out.stack_id().ok_or_else(|| Error::Aws(format!("no stack id returned creating {name}")))?;
            StackChange { operation: Operation::Create, stack_id: stack_id.to_string() }
        }
    };
    debug!(stack = name, id = %change.stack_id, operation = ?change.operation, "stack change started");
    Ok(Some(change))
}

/// create or update, then wait for a terminal status. Returns the stack outputs.
pub async fn deploy_stack(client: &Client, stack: &SynthesizedStack, poll_interval: Duration) -> Result<BTreeMap<String, String>> {
    let name = stack.stack_name.as_str();
    if let Some(change) = create_or_update_stack(client, stack).await? {
        return wait_for_output(client, &change.stack_id, change.operation, poll_interval).await;
    }
    match describe_stack(client, name, Operation::Update).await? {
        Some(existing) => Ok(stack_outputs(existing.outputs())),
        None => wait_for_output(client, name, Operation::Update, poll_interval).await,
    }
}

/// delete and wait for DELETE_COMPLETE, following the stack by id.
pub async fn delete_stack(client: &Client, name: &str, poll_interval: Duration) -> Result<()> {
    let Some(stack_id) = existing_stack_id(client, name).await? else {
        warn!(stack = name, "stack does not exist, nothing to delete");
        return Ok(());
    };
    info!(stack = name, "deleting stack");
    client
        .delete_stack()
        .stack_name(&stack_id)
        .send()
        .await
        .map_err(|e| Error::Aws(sdk_error(e)))?;
    wait_for_output(client, &stack_id, Operation::Delete, poll_interval).await?;
    info!(stack = name, "stack deleted");
    Ok(())
}
