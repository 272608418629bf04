use crate::error::{BuildDomainError, Result};
use crate::lock::{LockRequest, LockService, Resource, Ticket, WaitOutcome};
use crate::state::HandoffStore;
use crate::toolchain::{BuildOutcome, Toolchain};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{LazyLock, Mutex, MutexGuard};

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Switches the process working directory for the guard's lifetime.
pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // The working directory is process-global; hold the lock even if a
        // #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Run git in `repo_dir`, panicking with its output on failure.
pub(crate) fn git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// One recorded call against [`FakeLockService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ServiceCall {
    Enqueue {
        resource: String,
        lease_seconds: u64,
    },
    Wait {
        resource: String,
        ticket: String,
        timeout_seconds: u64,
    },
    Release {
        resource: String,
        ticket: String,
    },
}

#[derive(Debug, Clone)]
enum EnqueueScript {
    Ticket(String),
    Fail,
}

#[derive(Debug, Clone, Copy)]
enum WaitScript {
    Grant,
    TimeOut,
    Fail,
}

#[derive(Debug, Clone)]
struct Script {
    enqueue: EnqueueScript,
    wait: WaitScript,
}

/// Scripted lock service that records every call.
///
/// The default script applies to every resource; `with_ticket_for` and
/// `with_failing_enqueue_for` override it for one resource name.
pub(crate) struct FakeLockService {
    default: Script,
    per_resource: HashMap<String, Script>,
    fail_release: bool,
    calls: RefCell<Vec<ServiceCall>>,
}

impl FakeLockService {
    fn with_script(default: Script) -> Self {
        Self {
            default,
            per_resource: HashMap::new(),
            fail_release: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn granting(ticket: &str) -> Self {
        Self::with_script(Script {
            enqueue: EnqueueScript::Ticket(ticket.to_string()),
            wait: WaitScript::Grant,
        })
    }

    pub(crate) fn timing_out(ticket: &str) -> Self {
        Self::with_script(Script {
            enqueue: EnqueueScript::Ticket(ticket.to_string()),
            wait: WaitScript::TimeOut,
        })
    }

    pub(crate) fn failing_enqueue() -> Self {
        Self::with_script(Script {
            enqueue: EnqueueScript::Fail,
            wait: WaitScript::Grant,
        })
    }

    pub(crate) fn failing_wait(ticket: &str) -> Self {
        Self::with_script(Script {
            enqueue: EnqueueScript::Ticket(ticket.to_string()),
            wait: WaitScript::Fail,
        })
    }

    /// Make enqueue fail for one resource only.
    pub(crate) fn with_failing_enqueue_for(mut self, resource: &str) -> Self {
        self.per_resource.insert(
            resource.to_string(),
            Script {
                enqueue: EnqueueScript::Fail,
                wait: WaitScript::Grant,
            },
        );
        self
    }

    /// Grant one resource under its own ticket.
    pub(crate) fn with_ticket_for(mut self, resource: &str, ticket: &str) -> Self {
        self.per_resource.insert(
            resource.to_string(),
            Script {
                enqueue: EnqueueScript::Ticket(ticket.to_string()),
                wait: WaitScript::Grant,
            },
        );
        self
    }

    pub(crate) fn with_failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<ServiceCall> {
        self.calls.borrow().clone()
    }

    /// `(resource, ticket)` of every release call, in order.
    pub(crate) fn release_calls(&self) -> Vec<(String, String)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                ServiceCall::Release { resource, ticket } => {
                    Some((resource.clone(), ticket.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Resource names of every release call, in order.
    pub(crate) fn released_resources(&self) -> Vec<String> {
        self.release_calls().into_iter().map(|(r, _)| r).collect()
    }

    fn script_for(&self, resource: &str) -> &Script {
        self.per_resource.get(resource).unwrap_or(&self.default)
    }
}

impl LockService for FakeLockService {
    fn enqueue(&self, request: &LockRequest) -> Result<Ticket> {
        self.calls.borrow_mut().push(ServiceCall::Enqueue {
            resource: request.resource.name.clone(),
            lease_seconds: request.lease_seconds,
        });
        match &self.script_for(&request.resource.name).enqueue {
            EnqueueScript::Ticket(t) => Ok(Ticket::new(t.clone())),
            EnqueueScript::Fail => Err(BuildDomainError::AcquisitionError(
                "Failed to enqueue: service unavailable".to_string(),
            )),
        }
    }

    fn wait(
        &self,
        resource: &Resource,
        ticket: &Ticket,
        timeout_seconds: u64,
    ) -> Result<WaitOutcome> {
        self.calls.borrow_mut().push(ServiceCall::Wait {
            resource: resource.name.clone(),
            ticket: ticket.to_string(),
            timeout_seconds,
        });
        match self.script_for(&resource.name).wait {
            WaitScript::Grant => Ok(WaitOutcome::Acquired),
            WaitScript::TimeOut => Ok(WaitOutcome::TimedOut),
            WaitScript::Fail => Err(BuildDomainError::AcquisitionError(
                "Failed to acquire lock: connection reset".to_string(),
            )),
        }
    }

    fn release(&self, resource: &Resource, ticket: &Ticket) -> Result<()> {
        self.calls.borrow_mut().push(ServiceCall::Release {
            resource: resource.name.clone(),
            ticket: ticket.to_string(),
        });
        if self.fail_release {
            Err(BuildDomainError::ReleaseError("ticket not found".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory handoff store.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub(crate) values: BTreeMap<String, String>,
    pub(crate) writes: Vec<(String, String)>,
    pub(crate) discarded: bool,
}

impl HandoffStore for MemoryStore {
    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.writes.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn discard(&mut self) -> Result<()> {
        self.values.clear();
        self.discarded = true;
        Ok(())
    }
}

/// Toolchain stand-in recording which steps ran.
#[derive(Debug, Default)]
pub(crate) struct FakeToolchain {
    pub(crate) artifact_count: usize,
    pub(crate) fail_build: bool,
    pub(crate) panic_in_build: bool,
    pub(crate) fail_publish: bool,
    pub(crate) steps: RefCell<Vec<&'static str>>,
}

impl FakeToolchain {
    pub(crate) fn producing(artifact_count: usize) -> Self {
        Self {
            artifact_count,
            ..Self::default()
        }
    }

    pub(crate) fn steps(&self) -> Vec<&'static str> {
        self.steps.borrow().clone()
    }
}

impl Toolchain for FakeToolchain {
    fn prepare(&self) -> Result<()> {
        self.steps.borrow_mut().push("prepare");
        Ok(())
    }

    fn build(&self) -> Result<BuildOutcome> {
        self.steps.borrow_mut().push("build");
        if self.panic_in_build {
            panic!("build tool crashed");
        }
        if self.fail_build {
            return Err(BuildDomainError::OperationFailed("Build failed".to_string()));
        }
        Ok(BuildOutcome {
            artifact_count: self.artifact_count,
        })
    }

    fn publish(&self) -> Result<()> {
        self.steps.borrow_mut().push("publish");
        if self.fail_publish {
            return Err(BuildDomainError::OperationFailed("Publish failed".to_string()));
        }
        Ok(())
    }

    fn sync_tags(&self) -> Result<()> {
        self.steps.borrow_mut().push("sync_tags");
        Ok(())
    }

    fn generate_release_candidate(&self) -> Result<String> {
        self.steps.borrow_mut().push("release_candidate");
        Ok("main-1".to_string())
    }
}
