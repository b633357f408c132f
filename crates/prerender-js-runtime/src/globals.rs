//! Host functions installed into every render interpreter.
//!
//! The bootstrap script builds `console`, timers, `fetch` and `__render` on
//! top of these.

use std::time::Instant;

use rquickjs::{Ctx, Function, Result as JsResult};

use crate::bridge::HostBridge;
use crate::types::FetchRequest;

/// Register `__host_log`, `__host_now`, `__host_report` and `__host_fetch`.
pub fn register_render_globals(ctx: &Ctx<'_>, bridge: HostBridge) -> JsResult<()> {
    let globals = ctx.globals();

    globals.set(
        "__host_log",
        Function::new(ctx.clone(), |level: String, msg: String| match level.as_str() {
            "error" => tracing::error!(target: "prerender.js.console", "{}", msg),
            "warn" => tracing::warn!(target: "prerender.js.console", "{}", msg),
            "debug" => tracing::debug!(target: "prerender.js.console", "{}", msg),
            "trace" => tracing::trace!(target: "prerender.js.console", "{}", msg),
            _ => tracing::info!(target: "prerender.js.console", "{}", msg),
        })?,
    )?;

    // Monotonic milliseconds since the interpreter was created
    let started = Instant::now();
    globals.set(
        "__host_now",
        Function::new(ctx.clone(), move || started.elapsed().as_secs_f64() * 1000.0)?,
    )?;

    let reporter = bridge.clone();
    globals.set(
        "__host_report",
        Function::new(ctx.clone(), move |payload: String| {
            if !reporter.report(&payload) {
                tracing::debug!("Render result reported with no job waiting");
            }
        })?,
    )?;

    globals.set(
        "__host_fetch",
        Function::new(ctx.clone(), move |raw: String| fetch_json(&bridge, &raw))?,
    )?;

    Ok(())
}

/// Run a JSON-encoded fetch through the bridge and encode the answer.
///
/// Failures are encoded as `{"error": "..."}` so the bootstrap can reject the
/// script's promise instead of throwing across the boundary.
fn fetch_json(bridge: &HostBridge, raw: &str) -> String {
    let outcome = serde_json::from_str::<FetchRequest>(raw)
        .map_err(|e| format!("invalid fetch request: {}", e))
        .and_then(|request| bridge.fetch(&request).map_err(|e| e.to_string()));

    match outcome.and_then(|response| serde_json::to_string(&response).map_err(|e| e.to_string())) {
        Ok(json) => json,
        Err(message) => serde_json::json!({ "error": message }).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::FetchError;
    use crate::types::FetchResponse;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_register_globals() {
        let runtime = Runtime::new().unwrap();
        let ctx = Context::full(&runtime).unwrap();

        ctx.with(|ctx| {
            register_render_globals(&ctx, HostBridge::default()).unwrap();

            let globals = ctx.globals();
            let _report: Function = globals.get("__host_report").unwrap();
            let _fetch: Function = globals.get("__host_fetch").unwrap();

            let now: f64 = ctx.eval("__host_now() + 0.5").unwrap();
            assert!(now >= 0.5);
        });
    }

    #[test]
    fn test_fetch_json_encodes_errors() {
        let denied = fetch_json(&HostBridge::default(), r#"{"url":"/api"}"#);
        assert!(denied.contains("error"));

        let invalid = fetch_json(&HostBridge::default(), "nope");
        assert!(invalid.contains("invalid fetch request"));
    }

    #[test]
    fn test_fetch_json_encodes_response() {
        let fetch = |req: &FetchRequest| -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse::ok(req.method.clone()))
        };
        let bridge = HostBridge::new(Arc::new(fetch));

        let raw = fetch_json(&bridge, r#"{"url":"/api","method":"POST"}"#);
        let response: FetchResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "POST");
    }
}
