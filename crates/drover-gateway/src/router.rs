// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fans decoded dispatches out to registered sinks.

use std::sync::{Arc, RwLock};

use drover_core::{DispatchEvent, DispatchFlow, DispatchSink};
use tracing::trace;

type Predicate = Box<dyn Fn(&DispatchEvent) -> bool + Send + Sync>;

struct Route {
    name: String,
    priority: i32,
    matches: Predicate,
    sink: Arc<dyn DispatchSink>,
}

/// Ordered list of sinks. Higher priority runs first; equal priorities keep
/// registration order. A sink returning [`DispatchFlow::Stop`] hides the
/// event from the rest.
#[derive(Default)]
pub struct DispatchRouter {
    routes: RwLock<Vec<Route>>,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for every event.
    pub fn register(&self, name: impl Into<String>, priority: i32, sink: Arc<dyn DispatchSink>) {
        self.register_filtered(name, priority, |_| true, sink);
    }

    /// Register a sink for events of the given types only.
    pub fn register_for(
        &self,
        name: impl Into<String>,
        priority: i32,
        event_types: &[&str],
        sink: Arc<dyn DispatchSink>,
    ) {
        let types: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();
        self.register_filtered(
            name,
            priority,
            move |event| types.iter().any(|t| *t == event.event_type),
            sink,
        );
    }

    pub fn register_filtered<F>(
        &self,
        name: impl Into<String>,
        priority: i32,
        matches: F,
        sink: Arc<dyn DispatchSink>,
    ) where
        F: Fn(&DispatchEvent) -> bool + Send + Sync + 'static,
    {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        let at = routes
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(routes.len());
        routes.insert(
            at,
            Route {
                name: name.into(),
                priority,
                matches: Box::new(matches),
                sink,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event`; returns how many sinks saw it.
    pub fn route(&self, event: &DispatchEvent) -> usize {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        for route in routes.iter().filter(|r| (r.matches)(event)) {
            delivered += 1;
            if route.sink.handle(event) == DispatchFlow::Stop {
                trace!(sink = %route.name, event = %event.event_type, "dispatch consumed");
                break;
            }
        }
        delivered
    }
}

impl DispatchSink for DispatchRouter {
    fn handle(&self, event: &DispatchEvent) -> DispatchFlow {
        self.route(event);
        DispatchFlow::Continue
    }
}

impl std::fmt::Debug for DispatchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        let names: Vec<&str> = routes.iter().map(|r| r.name.as_str()).collect();
        f.debug_struct("DispatchRouter").field("routes", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct Recorder {
        label: &'static str,
        flow: DispatchFlow,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DispatchSink for Recorder {
        fn handle(&self, _event: &DispatchEvent) -> DispatchFlow {
            self.log.lock().unwrap().push(self.label);
            self.flow
        }
    }

    fn sink(
        label: &'static str,
        flow: DispatchFlow,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn DispatchSink> {
        Arc::new(Recorder {
            label,
            flow,
            log: Arc::clone(log),
        })
    }

    fn event(event_type: &str) -> DispatchEvent {
        DispatchEvent {
            account_id: "acct".into(),
            sequence: Some(1),
            event_type: event_type.into(),
            data: json!({"channel_id": "c1"}),
        }
    }

    #[test]
    fn higher_priority_runs_first_and_stop_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = DispatchRouter::new();
        router.register("low", 0, sink("low", DispatchFlow::Continue, &log));
        router.register("high", 10, sink("high", DispatchFlow::Continue, &log));
        router.register("mid", 5, sink("mid", DispatchFlow::Stop, &log));

        assert_eq!(router.route(&event("MESSAGE_CREATE")), 2);
        assert_eq!(*log.lock().unwrap(), vec!["high", "mid"]);
    }

    #[test]
    fn type_filter_skips_other_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = DispatchRouter::new();
        router.register_for(
            "create",
            0,
            &["MESSAGE_CREATE"],
            sink("create", DispatchFlow::Continue, &log),
        );

        assert_eq!(router.route(&event("MESSAGE_UPDATE")), 0);
        assert_eq!(router.route(&event("MESSAGE_CREATE")), 1);
        assert_eq!(*log.lock().unwrap(), vec!["create"]);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = DispatchRouter::new();
        router.register("a", 1, sink("a", DispatchFlow::Continue, &log));
        router.register("b", 1, sink("b", DispatchFlow::Continue, &log));
        router.route(&event("READY"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }
}
