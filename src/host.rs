//! Re-invocation host
//!
//! Plays the scheduler's part for one operation: hands the returned context
//! back to the next invocation, waits `retry_after` in between and stops at
//! the first terminal event. A [`ContextStore`] keeps the context on disk so
//! an interrupted operation resumes instead of starting over.

use crate::error::Error;
use crate::handlers::{HandlerEvent, HandlerRequest, Handlers};
use anyhow::{Context, Result};
use reconcile::{CallbackContext, ManualClock, Operation, ProgressEvent};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on invocations per operation
pub const DEFAULT_MAX_INVOCATIONS: usize = 200;

/// Waits out `retry_after` between invocations
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated waiting: the clock jumps ahead instead
impl Sleeper for ManualClock {
    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Summary of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub number: usize,
    pub status: &'static str,
    pub retry_after_secs: Option<u64>,
}

impl Invocation {
    fn from_event(number: usize, event: &HandlerEvent) -> Self {
        let (status, retry_after_secs) = match event {
            ProgressEvent::InProgress { retry_after, .. } => {
                ("IN_PROGRESS", Some(retry_after.as_secs()))
            }
            ProgressEvent::Success { .. } => ("SUCCESS", None),
            ProgressEvent::Failed { .. } => ("FAILED", None),
        };
        Self {
            number,
            status,
            retry_after_secs,
        }
    }
}

/// Terminal event of a driven operation and how it got there
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub event: HandlerEvent,
    pub invocations: Vec<Invocation>,
}

// ============================================================================
// Context Store
// ============================================================================

/// Resumable context persisted as JSON
#[derive(Debug, Clone)]
pub struct ContextStore {
    path: PathBuf,
}

impl ContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored context, `None` if nothing was stored
    pub fn load(&self) -> Result<Option<CallbackContext>> {
        if !self.path.exists() {
            log::debug!("Context file {} does not exist", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read context file: {}", self.path.display()))?;
        let ctx = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse context file: {}", self.path.display()))?;

        log::debug!("Loaded context from {}", self.path.display());
        Ok(Some(ctx))
    }

    pub fn save(&self, ctx: &CallbackContext) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create context directory: {}", dir.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(ctx).context("Failed to serialize context to JSON")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write context file: {}", self.path.display()))?;

        log::debug!("Saved context to {}", self.path.display());
        Ok(())
    }

    /// Forget the stored context once the operation succeeded
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove context file: {}", self.path.display())
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// Host
// ============================================================================

pub struct Host<'a> {
    handlers: Handlers<'a>,
    sleeper: &'a dyn Sleeper,
    max_invocations: usize,
    store: Option<ContextStore>,
}

impl<'a> Host<'a> {
    pub fn new(handlers: Handlers<'a>, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            handlers,
            sleeper,
            max_invocations: DEFAULT_MAX_INVOCATIONS,
            store: None,
        }
    }

    pub fn max_invocations(mut self, limit: usize) -> Self {
        self.max_invocations = limit.max(1);
        self
    }

    pub fn with_store(mut self, store: ContextStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Keep the context of an unfinished operation, drop it on success
    ///
    /// A failed context gets its stabilization deadlines restarted; a retry
    /// after a timeout would otherwise fail on its first negative poll.
    fn persist(&self, event: &HandlerEvent) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match event {
            ProgressEvent::Failed { context, .. } => {
                let mut ctx = context.clone();
                ctx.restart_stabilizations();
                store.save(&ctx)
            }
            ProgressEvent::InProgress { context, .. } => store.save(context),
            ProgressEvent::Success { .. } => store.clear(),
        }
    }

    /// Invoke `operation` until it succeeds or fails
    ///
    /// A stored context, if any, replaces the one in `request`. Failed
    /// operations keep their context so a corrected retry resumes after the
    /// steps that already went through.
    pub fn drive(&self, operation: Operation, mut request: HandlerRequest) -> Result<Outcome> {
        if let Some(ctx) = self.store.as_ref().map(ContextStore::load).transpose()?.flatten() {
            log::info!("{operation}: resuming from stored context");
            request.context = ctx;
        }

        let mut invocations = Vec::new();
        for number in 1..=self.max_invocations {
            let event = self.handlers.handle(operation, request.clone());
            invocations.push(Invocation::from_event(number, &event));
            self.persist(&event)?;

            match event {
                ProgressEvent::InProgress {
                    context,
                    retry_after,
                    ..
                } => {
                    log::info!(
                        "{operation}: invocation {number} in progress, waiting {}s",
                        retry_after.as_secs()
                    );
                    request.context = context;
                    self.sleeper.sleep(retry_after);
                }
                terminal => {
                    log::info!("{operation}: terminal after {number} invocation(s)");
                    return Ok(Outcome {
                        event: terminal,
                        invocations,
                    });
                }
            }
        }

        Err(Error::InvocationLimit {
            operation,
            limit: self.max_invocations,
        }
        .into())
    }
}
