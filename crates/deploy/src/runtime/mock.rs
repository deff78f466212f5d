//! In-memory container runtime for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContainerHandle, ContainerRuntime, RunRequest, RuntimeError};

#[derive(Debug, Clone)]
struct MockContainer {
    id: String,
    status: String,
    logs: Vec<u8>,
}

/// Mock runtime with configurable failures.
///
/// # Example
///
/// ```rust
/// use mlil_deploy::runtime::MockRuntime;
///
/// let runtime = MockRuntime::new()
///     .with_status("running")
///     .with_stop_failure("container is paused");
/// assert_eq!(runtime.call_count(), 0);
/// ```
#[derive(Debug)]
pub struct MockRuntime {
    containers: Mutex<HashMap<String, MockContainer>>,
    runs: Mutex<Vec<RunRequest>>,
    prepared: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    run_failure: Mutex<Option<String>>,
    named_run_failures: Mutex<HashMap<String, String>>,
    stop_failure: Mutex<Option<String>>,
    default_status: String,
    default_logs: Vec<u8>,
    start_delay: Option<Duration>,
    pull_delay: Option<Duration>,
    calls: AtomicUsize,
    next_id: AtomicU64,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            run_failure: Mutex::new(None),
            named_run_failures: Mutex::new(HashMap::new()),
            stop_failure: Mutex::new(None),
            default_status: "running".to_string(),
            default_logs: Vec::new(),
            start_delay: None,
            pull_delay: None,
            calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Status reported for every started container.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.default_status = status.into();
        self
    }

    /// Log output captured by every started container.
    pub fn with_logs(mut self, logs: impl Into<Vec<u8>>) -> Self {
        self.default_logs = logs.into();
        self
    }

    /// Hold every start request for `delay` after the container exists,
    /// like an engine that is slow to report a successful start.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Hold every image preparation for `delay`.
    pub fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    /// Reject every start request with `message`.
    pub fn with_run_failure(self, message: impl Into<String>) -> Self {
        self.set_run_failure(Some(message.into()));
        self
    }

    /// Reject every stop request with `message`.
    pub fn with_stop_failure(self, message: impl Into<String>) -> Self {
        self.set_stop_failure(Some(message.into()));
        self
    }

    pub fn set_run_failure(&self, message: Option<String>) {
        *lock(&self.run_failure) = message;
    }

    pub fn set_stop_failure(&self, message: Option<String>) {
        *lock(&self.stop_failure) = message;
    }

    /// Reject start requests for the container `name` only.
    pub fn fail_run_for(&self, name: impl Into<String>, message: impl Into<String>) {
        lock(&self.named_run_failures).insert(name.into(), message.into());
    }

    /// Drop a container without going through `stop`, as if it crashed or
    /// was removed behind the manager's back.
    pub fn forget(&self, name: &str) -> bool {
        lock(&self.containers).remove(name).is_some()
    }

    /// Set the status reported for an existing container.
    pub fn set_container_status(&self, name: &str, status: impl Into<String>) {
        if let Some(container) = lock(&self.containers).get_mut(name) {
            container.status = status.into();
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.containers).contains_key(name)
    }

    pub fn container_count(&self) -> usize {
        lock(&self.containers).len()
    }

    /// Start requests received so far, including rejected ones.
    pub fn run_requests(&self) -> Vec<RunRequest> {
        lock(&self.runs).clone()
    }

    /// Images passed to `prepare_image`, in call order.
    pub fn prepared_images(&self) -> Vec<String> {
        lock(&self.prepared).clone()
    }

    /// Names passed to `remove`, in call order.
    pub fn removed_names(&self) -> Vec<String> {
        lock(&self.removed).clone()
    }

    /// Total number of runtime calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn container(&self, handle: &ContainerHandle) -> Result<MockContainer, RuntimeError> {
        lock(&self.containers)
            .get(&handle.name)
            .filter(|c| c.id == handle.id)
            .cloned()
            .ok_or_else(|| RuntimeError::new(format!("No such container: {}", handle.name)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn prepare_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record_call();
        lock(&self.prepared).push(image.to_string());
        if let Some(delay) = self.pull_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> Result<ContainerHandle, RuntimeError> {
        self.record_call();
        lock(&self.runs).push(request.clone());

        let failure = lock(&self.named_run_failures)
            .get(&request.name)
            .cloned()
            .or_else(|| lock(&self.run_failure).clone());
        if let Some(message) = failure {
            return Err(RuntimeError::new(message));
        }

        let id = format!("mock-{:012x}", self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.containers).insert(
            request.name.clone(),
            MockContainer {
                id: id.clone(),
                status: self.default_status.clone(),
                logs: self.default_logs.clone(),
            },
        );

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        Ok(ContainerHandle {
            id,
            name: request.name,
        })
    }

    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        self.record_call();
        Ok(lock(&self.containers).get(name).map(|c| ContainerHandle {
            id: c.id.clone(),
            name: name.to_string(),
        }))
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record_call();

        if let Some(message) = lock(&self.stop_failure).clone() {
            return Err(RuntimeError::new(message));
        }

        self.container(handle)?;
        // auto-remove
        lock(&self.containers).remove(&handle.name);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.record_call();
        lock(&self.removed).push(name.to_string());
        lock(&self.containers).remove(name);
        Ok(())
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>, RuntimeError> {
        self.record_call();
        Ok(self.container(handle)?.logs)
    }

    async fn status(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        self.record_call();
        Ok(self.container(handle)?.status)
    }
}
