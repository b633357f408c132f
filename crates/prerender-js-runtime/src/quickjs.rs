//! QuickJS-backed render engine.
//!
//! One [`QuickJsEngine`] owns one QuickJS runtime and context. QuickJS is
//! single-threaded: the engine must stay on the thread that created it.

use std::path::Path;
use std::time::Duration;

use rquickjs::{Context, Ctx, Runtime, Value as JsValue};

use crate::bridge::HostBridge;
use crate::engine::{EngineLoader, ScriptEngine};
use crate::error::EngineError;
use crate::globals::register_render_globals;
use crate::types::RenderRequest;

/// Host environment evaluated ahead of every bundle.
pub const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Loads bundles from disk into fresh QuickJS engines.
#[derive(Debug, Clone, Default)]
pub struct QuickJsLoader {
    memory_limit: Option<usize>,
}

impl QuickJsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the heap of every engine this loader creates.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }
}

impl EngineLoader for QuickJsLoader {
    fn load(&self, bundle: &Path, bridge: HostBridge) -> Result<Box<dyn ScriptEngine>, EngineError> {
        let source =
            std::fs::read_to_string(bundle).map_err(|source| EngineError::BundleUnreadable {
                path: bundle.to_path_buf(),
                source,
            })?;

        let engine = QuickJsEngine::new(&bundle.display().to_string(), &source, bridge)?;
        if let Some(limit) = self.memory_limit {
            engine.runtime.set_memory_limit(limit);
        }
        tracing::debug!(bundle = %bundle.display(), "Bundle loaded");
        Ok(Box::new(engine))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// A render bundle loaded into a QuickJS interpreter.
pub struct QuickJsEngine {
    context: Context,
    runtime: Runtime,
    bridge: HostBridge,
}

impl QuickJsEngine {
    /// Create an interpreter, install the host environment and evaluate
    /// `source` as the bundle.
    ///
    /// The interpreter stops executing as soon as `bridge` is closed.
    pub fn new(name: &str, source: &str, bridge: HostBridge) -> Result<Self, EngineError> {
        let runtime = Runtime::new().map_err(|e| EngineError::Init(e.to_string()))?;
        let halt = bridge.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || halt.is_closed())));

        let context = Context::full(&runtime).map_err(|e| EngineError::Init(e.to_string()))?;

        context.with(|ctx| -> Result<(), EngineError> {
            register_render_globals(&ctx, bridge.clone())
                .map_err(|e| EngineError::Init(e.to_string()))?;

            ctx.eval::<JsValue, _>(BOOTSTRAP_JS)
                .map_err(|e| EngineError::Init(describe(&ctx, e)))?;

            ctx.eval::<JsValue, _>(source)
                .map_err(|e| EngineError::BundleEval(format!("{}: {}", name, describe(&ctx, e))))?;

            let has_main: bool = ctx
                .eval("typeof main === 'function'")
                .map_err(|e| EngineError::Init(describe(&ctx, e)))?;
            if !has_main {
                return Err(EngineError::MissingEntryPoint);
            }
            Ok(())
        })?;

        let engine = Self {
            context,
            runtime,
            bridge,
        };
        engine
            .drain_jobs()
            .map_err(|e| EngineError::BundleEval(format!("{}: {}", name, e)))?;
        Ok(engine)
    }

    /// Number of timers the script currently has scheduled.
    pub fn pending_timers(&self) -> usize {
        self.context.with(|ctx| {
            ctx.eval::<JsValue, _>("__timers.size()")
                .ok()
                .and_then(|v| v.as_number())
                .map(|n| n as usize)
                .unwrap_or(0)
        })
    }

    /// Evaluate `script`, discarding its value.
    fn run_script(&self, script: &str) -> Result<(), EngineError> {
        self.context.with(|ctx| {
            ctx.eval::<JsValue, _>(script)
                .map(|_| ())
                .map_err(|e| EngineError::Script(describe(&ctx, e)))
        })
    }

    /// Run queued promise jobs until none remain.
    fn drain_jobs(&self) -> Result<(), EngineError> {
        loop {
            if self.bridge.is_closed() {
                return Ok(());
            }
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(_) => {
                    return Err(EngineError::Script(
                        "Uncaught exception in promise job".to_string(),
                    ));
                }
            }
        }
    }
}

impl ScriptEngine for QuickJsEngine {
    fn dispatch(&mut self, request: &RenderRequest) -> Result<(), EngineError> {
        let request_json = serde_json::to_string(request)?;
        self.run_script(&format!("__render({});", request_json))?;
        self.drain_jobs()
    }

    fn next_timer(&mut self) -> Option<Duration> {
        let millis = self.context.with(|ctx| {
            ctx.eval::<JsValue, _>("__timers.next()")
                .ok()
                .and_then(|v| v.as_number())
        })?;
        (millis >= 0.0).then(|| Duration::from_secs_f64(millis / 1000.0))
    }

    fn run_due_timers(&mut self) -> Result<(), EngineError> {
        self.run_script("__timers.run();")?;
        self.drain_jobs()
    }

    fn flush_timers(&mut self) {
        // A closed bridge interrupts every eval; the timers go with the context.
        if self.bridge.is_closed() {
            return;
        }
        if let Err(e) = self.run_script("__timers.flush();") {
            tracing::warn!("Failed to flush script timers: {}", e);
        }
    }

    fn collect_garbage(&mut self) {
        self.runtime.run_gc();
    }
}

/// Turn an rquickjs error into a readable message, pulling the pending
/// exception out of the context when there is one.
fn describe(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }
    let caught = ctx.catch();
    if let Some(exception) = caught.as_exception() {
        return exception
            .message()
            .unwrap_or_else(|| "Uncaught exception".to_string());
    }
    caught
        .as_string()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| "Uncaught exception".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::FetchError;
    use crate::types::{FetchRequest, FetchResponse};

    fn setup(source: &str) -> (QuickJsEngine, HostBridge) {
        let bridge = HostBridge::default();
        let engine = QuickJsEngine::new("test.js", source, bridge.clone()).unwrap();
        (engine, bridge)
    }

    #[test]
    fn test_synchronous_render() {
        let (mut engine, bridge) = setup(
            r#"
            function main(request, callback) {
                callback({ app: "<h1>" + request.url + "</h1>", title: "Home", uuid: request.uuid });
            }
            "#,
        );

        let request = RenderRequest::new("/home");
        let mut rx = bridge.slot().arm(&request.correlation_id);
        engine.dispatch(&request).unwrap();

        let result = rx.try_recv().unwrap();
        assert_eq!(result.markup, "<h1>/home</h1>");
        assert_eq!(result.title, "Home");
        assert_eq!(result.correlation_id, request.correlation_id);
    }

    #[test]
    fn test_timer_driven_render() {
        let (mut engine, bridge) = setup(
            r#"
            function main(request, callback) {
                setTimeout(() => callback(JSON.stringify({ app: "late" })), 10);
            }
            "#,
        );

        let request = RenderRequest::new("/");
        let mut rx = bridge.slot().arm(&request.correlation_id);
        engine.dispatch(&request).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.pending_timers(), 1);

        let wait = engine.next_timer().expect("timer scheduled");
        std::thread::sleep(wait + Duration::from_millis(5));
        engine.run_due_timers().unwrap();

        assert_eq!(rx.try_recv().unwrap().markup, "late");
        assert!(engine.next_timer().is_none());
    }

    #[test]
    fn test_flush_cancels_timers() {
        let (mut engine, _bridge) = setup(
            r#"
            function main(request, callback) {
                setInterval(() => {}, 1000);
                setTimeout(() => callback({ app: "stale" }), 5000);
            }
            "#,
        );

        engine.dispatch(&RenderRequest::new("/")).unwrap();
        assert_eq!(engine.pending_timers(), 2);

        engine.flush_timers();
        assert_eq!(engine.pending_timers(), 0);
        assert!(engine.next_timer().is_none());
        engine.collect_garbage();
    }

    #[test]
    fn test_throwing_main_is_a_dispatch_error() {
        let (mut engine, _bridge) =
            setup("function main() { throw new Error('render exploded'); }");

        let err = engine.dispatch(&RenderRequest::new("/")).unwrap_err();
        assert!(matches!(err, EngineError::Script(ref msg) if msg.contains("render exploded")));
    }

    #[test]
    fn test_missing_main() {
        let result = QuickJsEngine::new("empty.js", "var app = 1;", HostBridge::default());
        assert!(matches!(result, Err(EngineError::MissingEntryPoint)));
    }

    #[test]
    fn test_syntax_error_in_bundle() {
        let result = QuickJsEngine::new("broken.js", "function main( {", HostBridge::default());
        assert!(matches!(result, Err(EngineError::BundleEval(_))));
    }

    #[test]
    fn test_fetch_resolves_through_bridge() {
        let fetch = |req: &FetchRequest| -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse::ok(format!("data for {}", req.url)))
        };
        let bridge = HostBridge::new(Arc::new(fetch));
        let mut engine = QuickJsEngine::new(
            "fetch.js",
            r#"
            function main(request, callback) {
                fetch("/api/items")
                    .then((res) => res.text())
                    .then((body) => callback({ app: body }))
                    .catch((err) => callback({ error: String(err) }));
            }
            "#,
            bridge.clone(),
        )
        .unwrap();

        let mut rx = bridge.slot().arm("fetch");
        engine.dispatch(&RenderRequest::new("/")).unwrap();
        assert_eq!(rx.try_recv().unwrap().markup, "data for /api/items");
    }

    #[test]
    fn test_denied_fetch_rejects_promise() {
        let (mut engine, bridge) = setup(
            r#"
            function main(request, callback) {
                fetch("/api").then(
                    () => callback({ app: "unexpected" }),
                    (err) => callback({ error: err.message })
                );
            }
            "#,
        );

        let mut rx = bridge.slot().arm("denied");
        engine.dispatch(&RenderRequest::new("/")).unwrap();
        assert!(rx.try_recv().unwrap().error.contains("not available"));
    }

    #[test]
    fn test_console_does_not_throw() {
        let (mut engine, bridge) = setup(
            r#"
            function main(request, callback) {
                console.log("rendering", request.url, { n: 1 }, undefined);
                console.error(new Error("logged"));
                callback({ app: "ok" });
            }
            "#,
        );

        let mut rx = bridge.slot().arm("console");
        engine.dispatch(&RenderRequest::new("/")).unwrap();
        assert_eq!(rx.try_recv().unwrap().markup, "ok");
    }

    #[test]
    fn test_closing_bridge_halts_runaway_script() {
        let (mut engine, bridge) = setup("function main() { while (true) {} }");

        let closer = bridge.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            closer.close();
        });

        assert!(engine.dispatch(&RenderRequest::new("/")).is_err());
        handle.join().unwrap();
    }

    #[test]
    fn test_loader_reports_missing_bundle() {
        let result = QuickJsLoader::new().load(
            Path::new("/nonexistent/prerender/bundle.js"),
            HostBridge::default(),
        );
        assert!(matches!(result, Err(EngineError::BundleUnreadable { .. })));
    }
}
