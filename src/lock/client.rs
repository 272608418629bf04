//! Client for the remote lock service.
//!
//! The service is reached through the `sfp server resource` command family.
//! Responses are unstructured text on two channels plus an exit status; the
//! only things parsed out of them are the ticket token (see [`super::ticket`])
//! and the wait timeout marker.

use crate::error::{BuildDomainError, Result};
use crate::lock::resource::{LockRequest, Resource, Ticket};
use crate::lock::ticket::extract_ticket;
use crate::process::{self, CommandOutput};
use tracing::{debug, info, warn};

/// Text the service prints when a wait elapses.
///
/// The service has been seen to exit 0 on timeout, so this marker is checked
/// on both channels before the exit status is looked at. It is a plain
/// substring match and will break if the service rewords the message.
pub const TIMEOUT_MARKER: &str = "Timeout";

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Acquired,
    TimedOut,
}

/// The three operations of the lock authority.
pub trait LockService {
    /// Request a slot in the resource's queue.
    fn enqueue(&self, request: &LockRequest) -> Result<Ticket>;

    /// Block until the ticket is granted or `timeout_seconds` elapses.
    fn wait(
        &self,
        resource: &Resource,
        ticket: &Ticket,
        timeout_seconds: u64,
    ) -> Result<WaitOutcome>;

    /// Give the resource back.
    fn release(&self, resource: &Resource, ticket: &Ticket) -> Result<()>;
}

/// [`LockService`] backed by the `sfp` CLI.
#[derive(Debug, Clone)]
pub struct SfpLockService {
    program: String,
    server_url: String,
    token: String,
}

impl SfpLockService {
    pub fn new(
        program: impl Into<String>,
        server_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            server_url: server_url.into(),
            token: token.into(),
        }
    }

    fn run(&self, args: Vec<String>) -> Result<CommandOutput> {
        process::run_captured(&self.program, &args, &[&self.token])
    }

    fn connection_args(&self) -> [String; 4] {
        [
            "--sfp-server-url".to_string(),
            self.server_url.clone(),
            "--application-token".to_string(),
            self.token.clone(),
        ]
    }

    /// Arguments for `sfp server resource enqueue`.
    pub fn enqueue_args(&self, request: &LockRequest) -> Vec<String> {
        let lease = request.lease_seconds.to_string();
        let mut args = process::args([
            "server",
            "resource",
            "enqueue",
            "--repository",
            request.resource.repository.as_str(),
            "--resource",
            request.resource.name.as_str(),
            "--leasefor",
            lease.as_str(),
        ]);
        args.extend(self.connection_args());
        args
    }

    /// Arguments for `sfp server resource wait`.
    pub fn wait_args(
        &self,
        resource: &Resource,
        ticket: &Ticket,
        timeout_seconds: u64,
    ) -> Vec<String> {
        let timeout = timeout_seconds.to_string();
        let mut args = process::args([
            "server",
            "resource",
            "wait",
            "--repository",
            resource.repository.as_str(),
            "--resource",
            resource.name.as_str(),
            "--ticketid",
            ticket.as_str(),
            "--wait",
            timeout.as_str(),
        ]);
        args.extend(self.connection_args());
        args
    }

    /// Arguments for `sfp server resource dequeue`.
    pub fn release_args(&self, resource: &Resource, ticket: &Ticket) -> Vec<String> {
        let mut args = process::args([
            "server",
            "resource",
            "dequeue",
            "--repository",
            resource.repository.as_str(),
            "--resource",
            resource.name.as_str(),
            "--ticketid",
            ticket.as_str(),
        ]);
        args.extend(self.connection_args());
        args
    }
}

impl LockService for SfpLockService {
    fn enqueue(&self, request: &LockRequest) -> Result<Ticket> {
        info!(
            resource = %request.resource.name,
            lease_seconds = request.lease_seconds,
            "enqueueing for resource"
        );
        let output = self.run(self.enqueue_args(request))?;
        let ticket = interpret_enqueue(&output)?;
        info!(ticket = %ticket, "enqueued");
        Ok(ticket)
    }

    fn wait(
        &self,
        resource: &Resource,
        ticket: &Ticket,
        timeout_seconds: u64,
    ) -> Result<WaitOutcome> {
        info!(resource = %resource.name, timeout_seconds, "waiting for lock");
        let output = self.run(self.wait_args(resource, ticket, timeout_seconds))?;
        for line in output.stdout.lines() {
            debug!("{}", line);
        }
        let outcome = interpret_wait(&output)?;
        match outcome {
            WaitOutcome::Acquired => info!(resource = %resource.name, "lock acquired"),
            WaitOutcome::TimedOut => {
                warn!(resource = %resource.name, "timeout waiting for lock")
            }
        }
        Ok(outcome)
    }

    fn release(&self, resource: &Resource, ticket: &Ticket) -> Result<()> {
        info!(resource = %resource.name, ticket = %ticket, "releasing lock");
        let output = self.run(self.release_args(resource, ticket))?;
        interpret_release(&output)?;
        info!(resource = %resource.name, "lock released");
        Ok(())
    }
}

/// Interpret an enqueue response: non-zero status fails, otherwise a ticket
/// must be recoverable from stdout.
pub fn interpret_enqueue(output: &CommandOutput) -> Result<Ticket> {
    if !output.success() {
        return Err(BuildDomainError::AcquisitionError(format!(
            "Failed to enqueue: {}",
            output.diagnostics()
        )));
    }
    extract_ticket(&output.stdout)
}

/// Interpret a wait response. The timeout marker takes precedence over the
/// exit status.
pub fn interpret_wait(output: &CommandOutput) -> Result<WaitOutcome> {
    if output.mentions(TIMEOUT_MARKER) {
        return Ok(WaitOutcome::TimedOut);
    }
    if !output.success() {
        return Err(BuildDomainError::AcquisitionError(format!(
            "Failed to acquire lock: {}",
            output.diagnostics()
        )));
    }
    Ok(WaitOutcome::Acquired)
}

/// Interpret a release response.
pub fn interpret_release(output: &CommandOutput) -> Result<()> {
    if !output.success() {
        if !output.stderr.is_empty() {
            debug!(stderr = %output.stderr, "sfp dequeue failed");
        }
        return Err(BuildDomainError::ReleaseError(
            output.diagnostics().to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    fn service() -> SfpLockService {
        SfpLockService::new("sfp", "https://sfp.example.com", "tok")
    }

    #[test]
    fn enqueue_success_extracts_ticket() {
        let ticket = interpret_enqueue(&output("Ticket ID: 5-1-aaaa-bbbb", "", 0)).unwrap();
        assert_eq!(ticket.as_str(), "5-1-aaaa-bbbb");
    }

    #[test]
    fn enqueue_nonzero_status_is_acquisition_error() {
        let err = interpret_enqueue(&output("", "unauthorized", 1)).unwrap_err();
        assert!(matches!(err, BuildDomainError::AcquisitionError(_)));
        assert!(err.to_string().contains("unauthorized"));
    }

    #[test]
    fn enqueue_without_ticket_is_extraction_error() {
        let err = interpret_enqueue(&output("queued\nnot-a-ticket", "", 0)).unwrap_err();
        assert!(matches!(err, BuildDomainError::ExtractionError { .. }));
    }

    #[test]
    fn wait_marker_on_stdout_with_status_zero_is_timeout() {
        let outcome = interpret_wait(&output("Timeout waiting for resource", "", 0)).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_marker_on_stderr_with_status_zero_is_timeout() {
        let outcome = interpret_wait(&output("", "Error: Timeout", 0)).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_marker_beats_nonzero_status() {
        let outcome = interpret_wait(&output("", "Timeout", 1)).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_nonzero_without_marker_is_acquisition_error() {
        let err = interpret_wait(&output("", "connection refused", 2)).unwrap_err();
        assert!(matches!(err, BuildDomainError::AcquisitionError(_)));
    }

    #[test]
    fn wait_clean_success_is_acquired() {
        let outcome = interpret_wait(&output("Resource acquired", "", 0)).unwrap();
        assert_eq!(outcome, WaitOutcome::Acquired);
    }

    #[test]
    fn release_nonzero_is_release_error() {
        let err = interpret_release(&output("", "ticket not found", 1)).unwrap_err();
        assert!(matches!(err, BuildDomainError::ReleaseError(_)));
        assert!(err.to_string().contains("ticket not found"));
    }

    #[test]
    fn release_success() {
        assert!(interpret_release(&output("released", "", 0)).is_ok());
    }

    #[test]
    fn enqueue_args_carry_lease() {
        let request = LockRequest::new(Resource::build("widgets", "org/app"), 1800);
        let args = service().enqueue_args(&request);
        assert_eq!(&args[..3], ["server", "resource", "enqueue"]);
        let lease_pos = args.iter().position(|a| a == "--leasefor").unwrap();
        assert_eq!(args[lease_pos + 1], "1800");
        let res_pos = args.iter().position(|a| a == "--resource").unwrap();
        assert_eq!(args[res_pos + 1], "build-widgets");
        assert!(args.contains(&"--application-token".to_string()));
    }

    #[test]
    fn wait_args_carry_ticket_and_timeout() {
        let resource = Resource::build("widgets", "org/app");
        let args = service().wait_args(&resource, &Ticket::new("5-1-aaaa-bbbb"), 900);
        let ticket_pos = args.iter().position(|a| a == "--ticketid").unwrap();
        assert_eq!(args[ticket_pos + 1], "5-1-aaaa-bbbb");
        let wait_pos = args.iter().position(|a| a == "--wait").unwrap();
        assert_eq!(args[wait_pos + 1], "900");
    }

    #[test]
    fn release_args_use_dequeue() {
        let resource = Resource::publish("org/app");
        let args = service().release_args(&resource, &Ticket::new("1-2-ab"));
        assert_eq!(args[2], "dequeue");
        let repo_pos = args.iter().position(|a| a == "--repository").unwrap();
        assert_eq!(args[repo_pos + 1], "org/app");
    }
}
