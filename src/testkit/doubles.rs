//! Scripted stand-ins for the image builder, source control and sleeper.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BuildError, Result};
use crate::port::{BuildRequest, ImageBuilder, Sleeper, SourceControl};

// ---------------------------------------------------------------------------
// ScriptedBuilder
// ---------------------------------------------------------------------------

/// Records build requests instead of running a build tool.
pub struct ScriptedBuilder {
    available: bool,
    fail_with: Option<String>,
    builds: Mutex<Vec<BuildRequest>>,
}

impl ScriptedBuilder {
    pub fn new() -> Self {
        Self {
            available: true,
            fail_with: None,
            builds: Mutex::new(Vec::new()),
        }
    }

    /// Report the build tool as missing.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Fail every build with the given stderr.
    pub fn failing(stderr: &str) -> Self {
        Self {
            fail_with: Some(stderr.to_string()),
            ..Self::new()
        }
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.builds.lock().clone()
    }
}

impl Default for ScriptedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageBuilder for ScriptedBuilder {
    fn tool(&self) -> &str {
        "podman"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn build_and_push(&self, request: &BuildRequest) -> Result<()> {
        self.builds.lock().push(request.clone());
        match &self.fail_with {
            Some(stderr) => Err(BuildError::CommandFailed {
                command: format!("podman build -t {}", request.reference()),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// FixedSource
// ---------------------------------------------------------------------------

/// Always reports the same branch.
pub struct FixedSource {
    branch: String,
}

impl FixedSource {
    pub fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
        }
    }
}

#[async_trait]
impl SourceControl for FixedSource {
    async fn current_branch(&self) -> Result<String> {
        Ok(self.branch.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

type SleepHook = Box<dyn Fn(usize) + Send + Sync>;

/// Records requested delays and yields instead of sleeping.
///
/// An optional hook runs on every sleep with the 1-based call number, which
/// lets a test change cluster state while a retry loop is waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    calls: AtomicUsize,
    hook: Option<SleepHook>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.hook {
            hook(call);
        }
        tokio::task::yield_now().await;
    }
}
