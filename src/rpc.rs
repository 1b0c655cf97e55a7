//! Inter-application requests
//!
//! A caller blocks until the target's handler answers or the configured
//! timeout fires. The callee's failure reaches the caller only as a message.
//!
//! Each request runs its handler on a thread of its own. A timed-out handler
//! is not interrupted and keeps its thread until it returns, so every app has
//! a cap on running handlers; requests past the cap fail fast with a quota
//! error.

use crate::config::RpcConfig;
use crate::error::{Result, RuntimeError};
use crossbeam::channel::{bounded, RecvTimeoutError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Request handler of one application
pub trait AppHandler: Send + Sync {
    fn handle(&self, payload: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

impl<F> AppHandler for F
where
    F: Fn(serde_json::Value) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    fn handle(&self, payload: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self(payload)
    }
}

/// Releases a handler slot when the handler thread is done with it
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Routes requests between the applications of a process
pub struct AppGateway {
    handlers: DashMap<String, Arc<dyn AppHandler>>,
    /// Running handlers per target app
    in_flight: DashMap<String, Arc<AtomicUsize>>,
    timeout: Duration,
    max_in_flight: usize,
}

impl AppGateway {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            handlers: DashMap::new(),
            in_flight: DashMap::new(),
            timeout: config.timeout(),
            max_in_flight: config.max_in_flight,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Handlers of `app` still running, including those whose caller gave up
    pub fn in_flight(&self, app: &str) -> usize {
        self.in_flight
            .get(app)
            .map(|count| count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn acquire(&self, target: &str) -> Result<InFlightGuard> {
        let count = self
            .in_flight
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .value()
            .clone();
        if count.fetch_add(1, Ordering::AcqRel) >= self.max_in_flight {
            count.fetch_sub(1, Ordering::AcqRel);
            warn!(app = target, limit = self.max_in_flight, "too many app requests in flight");
            return Err(RuntimeError::Quota(format!(
                "App '{}' already has {} requests in flight",
                target, self.max_in_flight
            )));
        }
        Ok(InFlightGuard(count))
    }

    pub fn register(&self, app: impl Into<String>, handler: Arc<dyn AppHandler>) {
        self.handlers.insert(app.into(), handler);
    }

    pub fn unregister(&self, app: &str) -> bool {
        self.handlers.remove(app).is_some()
    }

    /// Send `payload` from `caller` to `target` and wait for the response
    pub fn request(&self, caller: &str, target: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        if caller == target {
            return Err(RuntimeError::SelfRequest(target.to_string()));
        }
        let handler = self
            .handlers
            .get(target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::NoSuchApp(target.to_string()))?;

        let slot = self.acquire(target)?;
        debug!(caller, target, "app request");
        let (tx, rx) = bounded(1);
        thread::Builder::new()
            .name(format!("app-{}", target))
            .spawn(move || {
                let _slot = slot;
                // The caller may have given up already
                let _ = tx.send(handler.handle(payload));
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(RuntimeError::ProcessingFailed {
                app: target.to_string(),
                message: err.to_string(),
            }),
            Err(RecvTimeoutError::Timeout) => {
                warn!(caller, target, timeout_ms = self.timeout.as_millis() as u64, "app request timed out");
                Err(RuntimeError::TimedOut(target.to_string()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RuntimeError::ProcessingFailed {
                app: target.to_string(),
                message: "handler terminated without a response".to_string(),
            }),
        }
    }
}

/// Request handle bound to the calling application
#[derive(Clone)]
pub struct AppClient {
    gateway: Arc<AppGateway>,
    caller: String,
}

impl AppClient {
    pub fn new(gateway: Arc<AppGateway>, caller: impl Into<String>) -> Self {
        Self {
            gateway,
            caller: caller.into(),
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn request(&self, target: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.gateway.request(&self.caller, target, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway(timeout_ms: u64) -> Arc<AppGateway> {
        let gateway = Arc::new(AppGateway::new(&RpcConfig {
            timeout_ms,
            ..RpcConfig::default()
        }));
        gateway.register(
            "echo",
            Arc::new(|payload: serde_json::Value| -> anyhow::Result<serde_json::Value> { Ok(json!({"echo": payload})) }),
        );
        gateway.register(
            "broken",
            Arc::new(|_: serde_json::Value| -> anyhow::Result<serde_json::Value> {
                anyhow::bail!("internal detail")
            }),
        );
        gateway.register(
            "slow",
            Arc::new(|_: serde_json::Value| -> anyhow::Result<serde_json::Value> {
                thread::sleep(Duration::from_millis(500));
                Ok(json!(null))
            }),
        );
        gateway.register(
            "panicky",
            Arc::new(|_: serde_json::Value| -> anyhow::Result<serde_json::Value> { panic!("boom") }),
        );
        gateway
    }

    #[test]
    fn test_request_kinds() {
        let client = AppClient::new(gateway(50), "me");
        assert_eq!(client.request("echo", json!(1)).unwrap(), json!({"echo": 1}));

        match client.request("broken", json!(null)) {
            Err(RuntimeError::ProcessingFailed { app, message }) => {
                assert_eq!(app, "broken");
                assert_eq!(message, "internal detail");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(client.request("slow", json!(null)), Err(RuntimeError::TimedOut(_))));
        assert!(matches!(client.request("panicky", json!(null)), Err(RuntimeError::ProcessingFailed { .. })));
        assert!(matches!(client.request("ghost", json!(null)), Err(RuntimeError::NoSuchApp(_))));
    }

    #[test]
    fn test_self_request() {
        let gateway = gateway(50);
        assert!(matches!(gateway.request("echo", "echo", json!(null)), Err(RuntimeError::SelfRequest(_))));
        assert!(gateway.unregister("echo"));
        assert!(matches!(gateway.request("me", "echo", json!(null)), Err(RuntimeError::NoSuchApp(_))));
    }

    #[test]
    fn test_in_flight_cap() {
        let gateway = AppGateway::new(&RpcConfig {
            timeout_ms: 20,
            max_in_flight: 1,
        });
        let (release, wait) = bounded::<()>(0);
        gateway.register(
            "stuck",
            Arc::new(move |_: serde_json::Value| -> anyhow::Result<serde_json::Value> {
                let _ = wait.recv();
                Ok(json!(null))
            }),
        );
        gateway.register(
            "echo",
            Arc::new(|payload: serde_json::Value| -> anyhow::Result<serde_json::Value> { Ok(payload) }),
        );

        assert!(matches!(gateway.request("me", "stuck", json!(null)), Err(RuntimeError::TimedOut(_))));
        assert_eq!(gateway.in_flight("stuck"), 1);
        assert!(matches!(gateway.request("me", "stuck", json!(null)), Err(RuntimeError::Quota(_))));
        assert_eq!(gateway.in_flight("stuck"), 1);

        // Other apps keep their own slots
        assert_eq!(gateway.request("me", "echo", json!(7)).unwrap(), json!(7));

        release.send(()).unwrap();
        for _ in 0..100 {
            if gateway.in_flight("stuck") == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(gateway.in_flight("stuck"), 0);
    }
}
