//! Scripted engine used by unit tests.
//!
//! Behaviour is chosen by the request path:
//!
//! | path            | behaviour                                          |
//! |-----------------|----------------------------------------------------|
//! | `/hang`         | accepts the job and never reports                  |
//! | `/delay/<ms>`   | reports from a timer after `<ms>`                  |
//! | `/block/<ms>`   | blocks the thread for `<ms>` like a slow host call |
//! | `/stale-timer`  | reports at once and leaves a timer that reports again |
//! | `/throw`        | dispatch fails with a script error                 |
//! | `/panic`        | dispatch panics                                    |
//! | `/redirect`     | reports a redirect to `/login`                     |
//! | `/empty`        | reports a result with nothing in it                |
//! | anything else   | reports `<div>{path}</div>`                        |

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use prerender_js_runtime::{
    EngineError, EngineLoader, HostBridge, RenderRequest, RenderResult, ScriptEngine,
};

#[derive(Default)]
pub struct Probes {
    loads: AtomicUsize,
    drops: AtomicUsize,
    flushes: AtomicUsize,
    collections: AtomicUsize,
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

impl Probes {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn collections(&self) -> usize {
        self.collections.load(Ordering::SeqCst)
    }
}

pub struct FakeLoader {
    probes: Arc<Probes>,
    fail: bool,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            probes: Arc::new(Probes::default()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn probes(&self) -> Arc<Probes> {
        self.probes.clone()
    }
}

impl EngineLoader for FakeLoader {
    fn load(&self, bundle: &Path, bridge: HostBridge) -> Result<Box<dyn ScriptEngine>, EngineError> {
        self.probes.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::BundleEval(format!(
                "{}: unexpected token",
                bundle.display()
            )));
        }
        Ok(Box::new(FakeEngine {
            bridge,
            timers: Vec::new(),
            probes: self.probes.clone(),
        }))
    }
}

struct FakeEngine {
    bridge: HostBridge,
    timers: Vec<(Instant, RenderResult)>,
    probes: Arc<Probes>,
}

impl FakeEngine {
    fn post(&self, result: RenderResult) {
        self.bridge.slot().post(result);
    }

    fn markup(markup: impl Into<String>) -> RenderResult {
        RenderResult {
            markup: markup.into(),
            ..Default::default()
        }
    }
}

impl ScriptEngine for FakeEngine {
    fn dispatch(&mut self, request: &RenderRequest) -> Result<(), EngineError> {
        let path = request.target_url.as_str();
        match path {
            "/hang" => {}
            "/throw" => return Err(EngineError::Script("Error: render exploded".to_string())),
            "/panic" => panic!("engine panicked on purpose"),
            "/redirect" => self.post(RenderResult {
                redirect: "/login".to_string(),
                ..Default::default()
            }),
            "/empty" => self.post(RenderResult::default()),
            "/stale-timer" => {
                self.post(Self::markup("<p>fresh</p>"));
                self.timers
                    .push((Instant::now() + Duration::from_millis(20), Self::markup("<p>stale</p>")));
            }
            _ => {
                if let Some(ms) = path.strip_prefix("/block/").and_then(|ms| ms.parse().ok()) {
                    std::thread::sleep(Duration::from_millis(ms));
                    self.post(Self::markup("<p>unblocked</p>"));
                } else if let Some(ms) =
                    path.strip_prefix("/delay/").and_then(|ms| ms.parse().ok())
                {
                    self.timers.push((
                        Instant::now() + Duration::from_millis(ms),
                        Self::markup(format!("<p>delayed {ms}ms</p>")),
                    ));
                } else {
                    self.post(Self::markup(format!("<div>{path}</div>")));
                }
            }
        }
        Ok(())
    }

    fn next_timer(&mut self) -> Option<Duration> {
        let now = Instant::now();
        self.timers
            .iter()
            .map(|(due, _)| due.saturating_duration_since(now))
            .min()
    }

    fn run_due_timers(&mut self) -> Result<(), EngineError> {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|(at, _)| *at <= now);
        self.timers = pending;
        for (_, result) in due {
            self.post(result);
        }
        Ok(())
    }

    fn flush_timers(&mut self) {
        self.timers.clear();
        self.probes.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn collect_garbage(&mut self) {
        self.probes.collections.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.probes.drops.fetch_add(1, Ordering::SeqCst);
    }
}
