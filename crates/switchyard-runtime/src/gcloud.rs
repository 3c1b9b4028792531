//! Control plane backed by the `gcloud` CLI.
//!
//! Every operation maps to one `gcloud` invocation. Existence checks use
//! `describe` (or `get-iam-policy` for bindings) and treat `NOT_FOUND` as
//! absent. Errors are classified from stderr.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use switchyard_core::{NaturalKey, ProvisioningOperation, RetryPolicy};

use crate::control_plane::{ControlPlane, ProvisionError};

// Pub/Sub bounds for push retry delay and ack deadline.
const PUBSUB_MAX_RETRY_DELAY: Duration = Duration::from_secs(600);
const PUBSUB_MIN_ACK_DEADLINE: Duration = Duration::from_secs(10);
const PUBSUB_MAX_ACK_DEADLINE: Duration = Duration::from_secs(600);

/// Where and how to run `gcloud`.
#[derive(Debug, Clone)]
pub struct GcloudSettings {
    pub binary: String,
    pub project: Option<String>,
    /// Required for grants and scheduler jobs.
    pub region: Option<String>,
}

impl Default for GcloudSettings {
    fn default() -> Self {
        Self {
            binary: "gcloud".to_string(),
            project: None,
            region: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GcloudControlPlane {
    settings: GcloudSettings,
}

impl GcloudControlPlane {
    pub fn new(settings: GcloudSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GcloudSettings {
        &self.settings
    }

    /// Arguments (without the binary) that create the resource.
    pub fn create_args(&self, operation: &ProvisioningOperation) -> Result<Vec<String>, ProvisionError> {
        let mut args: Vec<String> = match operation {
            ProvisioningOperation::GrantInvokerRole {
                member,
                service,
                role,
                ..
            } => {
                let mut args = strings(&["run", "services", "add-iam-policy-binding", service.as_str()]);
                args.push(format!("--member={}", member));
                args.push(format!("--role={}", role));
                args.push(format!("--region={}", self.region()?));
                args
            }
            ProvisioningOperation::CreateTopic { topic } => {
                strings(&["pubsub", "topics", "create", topic.as_str()])
            }
            ProvisioningOperation::CreateScheduleJob {
                job,
                schedule,
                time_zone,
                uri,
                http_method,
                audience,
                service_account,
                retry,
            } => {
                let mut args = strings(&["scheduler", "jobs", "create", "http", job.as_str()]);
                args.push(format!("--location={}", self.region()?));
                args.push(format!("--schedule={}", schedule));
                args.push(format!("--time-zone={}", time_zone));
                args.push(format!("--uri={}", uri));
                args.push(format!("--http-method={}", http_method));
                args.push(format!("--oidc-service-account-email={}", service_account));
                args.push(format!("--oidc-token-audience={}", audience));
                args.extend(scheduler_retry_args(retry));
                args
            }
            ProvisioningOperation::CreateSubscription {
                subscription,
                topic,
                push_endpoint,
                audience,
                service_account,
                retry,
            } => {
                let mut args = strings(&["pubsub", "subscriptions", "create", subscription.as_str()]);
                args.push(format!("--topic={}", topic));
                args.push(format!("--push-endpoint={}", push_endpoint));
                args.push(format!("--push-auth-service-account={}", service_account));
                args.push(format!("--push-auth-token-audience={}", audience));
                args.extend(subscription_retry_args(retry));
                args
            }
        };
        args.extend(self.project_args());
        Ok(args)
    }

    /// Arguments (without the binary) that look the resource up.
    pub fn describe_args(&self, key: &NaturalKey) -> Result<Vec<String>, ProvisionError> {
        let mut args = match key {
            NaturalKey::RoleBinding { resource, .. } => {
                let mut args = strings(&["run", "services", "get-iam-policy", resource.as_str()]);
                args.push(format!("--region={}", self.region()?));
                args
            }
            NaturalKey::ScheduleJob { name } => {
                let mut args = strings(&["scheduler", "jobs", "describe", name.as_str()]);
                args.push(format!("--location={}", self.region()?));
                args
            }
            NaturalKey::Topic { name } => strings(&["pubsub", "topics", "describe", name.as_str()]),
            NaturalKey::Subscription { name } => {
                strings(&["pubsub", "subscriptions", "describe", name.as_str()])
            }
        };
        args.push("--format=json".to_string());
        args.extend(self.project_args());
        Ok(args)
    }

    /// Shell-ready command line for an operation.
    pub fn render(&self, operation: &ProvisioningOperation) -> Result<String, ProvisionError> {
        let args = self.create_args(operation)?;
        let mut line = shell_quote(&self.settings.binary);
        for arg in &args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        Ok(line)
    }

    fn region(&self) -> Result<&str, ProvisionError> {
        self.settings.region.as_deref().ok_or_else(|| {
            ProvisionError::InvalidRequest("a region is required for run and scheduler resources".to_string())
        })
    }

    fn project_args(&self) -> Option<String> {
        self.settings
            .project
            .as_ref()
            .map(|project| format!("--project={}", project))
    }

    async fn invoke(&self, args: &[String]) -> Result<Invocation, ProvisionError> {
        tracing::debug!(binary = %self.settings.binary, args = ?args, "Running gcloud");
        let output = Command::new(&self.settings.binary)
            .args(args)
            .arg("--quiet")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProvisionError::InvalidRequest(format!(
                    "failed to run {}: {}",
                    self.settings.binary, e
                ))
            })?;
        Ok(Invocation {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

struct Invocation {
    success: bool,
    stdout: String,
    stderr: String,
}

#[async_trait]
impl ControlPlane for GcloudControlPlane {
    async fn exists(&self, key: &NaturalKey) -> Result<bool, ProvisionError> {
        let out = self.invoke(&self.describe_args(key)?).await?;
        if !out.success {
            return match classify(&out.stderr, key) {
                Classified::NotFound => Ok(false),
                Classified::Error(e) => Err(e),
            };
        }
        match key {
            NaturalKey::RoleBinding { role, member, .. } => {
                policy_has_binding(&out.stdout, role, member)
            }
            _ => Ok(true),
        }
    }

    async fn apply(&self, operation: &ProvisioningOperation) -> Result<(), ProvisionError> {
        let key = operation.natural_key();
        let out = self.invoke(&self.create_args(operation)?).await?;
        if out.success {
            return Ok(());
        }
        match classify(&out.stderr, &key) {
            // Creating into a missing parent (e.g. topic deleted underneath us).
            Classified::NotFound => Err(ProvisionError::Failed(first_line(&out.stderr))),
            Classified::Error(e) => Err(e),
        }
    }
}

enum Classified {
    NotFound,
    Error(ProvisionError),
}

fn classify(stderr: &str, key: &NaturalKey) -> Classified {
    let message = first_line(stderr);
    let lower = stderr.to_ascii_lowercase();
    if stderr.contains("ALREADY_EXISTS") || lower.contains("already exists") {
        Classified::Error(ProvisionError::already_exists(key))
    } else if stderr.contains("NOT_FOUND") || lower.contains("not found") {
        Classified::NotFound
    } else if stderr.contains("PERMISSION_DENIED") || lower.contains("permission denied") {
        Classified::Error(ProvisionError::PermissionDenied(message))
    } else if stderr.contains("UNAVAILABLE") || stderr.contains("DEADLINE_EXCEEDED") {
        Classified::Error(ProvisionError::Unavailable(message))
    } else if stderr.contains("INVALID_ARGUMENT") {
        Classified::Error(ProvisionError::InvalidRequest(message))
    } else {
        Classified::Error(ProvisionError::Failed(message))
    }
}

/// Whether an IAM policy document grants `role` to `member`.
fn policy_has_binding(policy_json: &str, role: &str, member: &str) -> Result<bool, ProvisionError> {
    let policy: serde_json::Value = serde_json::from_str(policy_json)
        .map_err(|e| ProvisionError::Failed(format!("unreadable IAM policy: {}", e)))?;
    let found = policy
        .get("bindings")
        .and_then(|b| b.as_array())
        .into_iter()
        .flatten()
        .filter(|binding| binding.get("role").and_then(|r| r.as_str()) == Some(role))
        .filter_map(|binding| binding.get("members").and_then(|m| m.as_array()))
        .flatten()
        .any(|m| m.as_str() == Some(member));
    Ok(found)
}

fn scheduler_retry_args(retry: &RetryPolicy) -> Vec<String> {
    vec![
        format!("--max-retry-attempts={}", retry.max_retries()),
        format!("--min-backoff={}", seconds(retry.min_backoff())),
        format!("--max-backoff={}", seconds(retry.max_backoff())),
        format!("--attempt-deadline={}", seconds(retry.deadline())),
    ]
}

fn subscription_retry_args(retry: &RetryPolicy) -> Vec<String> {
    let min_delay = retry.min_backoff().min(PUBSUB_MAX_RETRY_DELAY);
    let max_delay = retry.max_backoff().min(PUBSUB_MAX_RETRY_DELAY);
    let ack = retry
        .deadline()
        .clamp(PUBSUB_MIN_ACK_DEADLINE, PUBSUB_MAX_ACK_DEADLINE);
    vec![
        format!("--ack-deadline={}", ack.as_secs()),
        format!("--min-retry-delay={}", seconds(min_delay)),
        format!("--max-retry-delay={}", seconds(max_delay)),
    ]
}

fn seconds(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn first_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("gcloud exited with an error")
        .to_string()
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
