//! Mock aide for unit tests
//!
//! Records every invocation with its start and end time so tests can
//! assert that init and check never run at the same time, and writes the
//! files a real aide would produce so promotion logic can be exercised.

use crate::error::AideError;
use crate::exit::AideExit;
use crate::paths::AidePaths;
use crate::runner::AideRunner;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Init,
    Check,
}

#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub kind: InvocationKind,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    init_codes: VecDeque<i32>,
    check_codes: VecDeque<i32>,
    default_check_code: i32,
    check_log: Option<String>,
    invocations: Vec<Invocation>,
    running: usize,
    max_running: usize,
}

/// Mock aide for testing
#[derive(Debug, Clone)]
pub struct MockAide {
    paths: AidePaths,
    delay: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockAide {
    /// Create a mock writing its output files under `paths`
    pub fn new(paths: AidePaths) -> Self {
        Self {
            paths,
            delay: Duration::from_millis(20),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// How long each invocation takes
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the exit code of the next init
    pub fn push_init_code(&self, code: i32) {
        self.state().init_codes.push_back(code);
    }

    /// Queue the exit code of the next check
    pub fn push_check_code(&self, code: i32) {
        self.state().check_codes.push_back(code);
    }

    /// Exit code of checks once the queue is drained
    pub fn set_default_check_code(&self, code: i32) {
        self.state().default_check_code = code;
    }

    /// Log written to `aide.log.new` by every check
    pub fn set_check_log(&self, log: impl Into<String>) {
        self.state().check_log = Some(log.into());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state().invocations.clone()
    }

    pub fn count(&self, kind: InvocationKind) -> usize {
        self.state().invocations.iter().filter(|i| i.kind == kind).count()
    }

    /// Highest number of invocations that were in flight at once
    pub fn max_concurrent(&self) -> usize {
        self.state().max_running
    }

    /// Whether any two recorded invocations overlapped in time
    pub fn any_overlap(&self) -> bool {
        let mut calls = self.invocations();
        calls.sort_by_key(|i| i.started);
        calls.windows(2).any(|w| w[1].started < w[0].finished)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn invoke(&self, kind: InvocationKind) -> Result<AideExit, AideError> {
        let started = Instant::now();
        {
            let mut state = self.state();
            state.running += 1;
            state.max_running = state.max_running.max(state.running);
        }

        tokio::time::sleep(self.delay).await;

        let code = {
            let mut state = self.state();
            match kind {
                InvocationKind::Init => state.init_codes.pop_front().unwrap_or(0),
                InvocationKind::Check => {
                    let default = state.default_check_code;
                    state.check_codes.pop_front().unwrap_or(default)
                }
            }
        };

        let written = match kind {
            InvocationKind::Init if code == 0 => std::fs::write(self.paths.write_db(), b"aide-db")
                .map_err(|e| AideError::Io {
                    path: self.paths.write_db(),
                    source: e,
                }),
            InvocationKind::Check => {
                let log = self.state().check_log.clone();
                match log {
                    Some(log) => std::fs::write(self.paths.write_log(), log).map_err(|e| {
                        AideError::Io {
                            path: self.paths.write_log(),
                            source: e,
                        }
                    }),
                    None => Ok(()),
                }
            }
            InvocationKind::Init => Ok(()),
        };

        let mut state = self.state();
        state.running -= 1;
        state.invocations.push(Invocation {
            kind,
            started,
            finished: Instant::now(),
        });
        drop(state);

        written.map(|()| AideExit::from_code(code))
    }
}

#[async_trait::async_trait]
impl AideRunner for MockAide {
    async fn init(&self) -> Result<AideExit, AideError> {
        self.invoke(InvocationKind::Init).await
    }

    async fn check(&self) -> Result<AideExit, AideError> {
        self.invoke(InvocationKind::Check).await
    }
}
