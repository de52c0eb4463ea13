//! Best-effort delivery of domain events to independent handlers.

use rollcall_core::DomainEvent;
use std::sync::Arc;
use tracing::{info, warn};

/// A consumer of domain events (notifications, audit logging, metrics).
pub trait DomainEventHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Registry of handlers. Delivery is fire-and-forget: a failing handler is
/// logged and never affects the operation that emitted the event.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: Vec<Arc<dyn DomainEventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: DomainEventHandler + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn DomainEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn publish(&self, event: &DomainEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(event) {
                warn!(
                    handler = handler.name(),
                    event = event.name(),
                    "Event handler failed: {e:#}"
                );
            }
        }
    }
}

/// Logs every event at info level.
pub struct TracingHandler;

impl DomainEventHandler for TracingHandler {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        info!(event = event.name(), "{}", serde_json::to_string(event)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<&'static str>>);

    impl DomainEventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.name());
            Ok(())
        }
    }

    struct Failing;

    impl DomainEventHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            anyhow::bail!("mail server down")
        }
    }

    #[test]
    fn failing_handler_does_not_stop_delivery() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut bus = EventBus::new();
        bus.register(Failing);
        bus.register_arc(recorder.clone());
        bus.publish(&DomainEvent::AbsencesFlagged {
            event_id: 1,
            flagged: 2,
        });
        assert_eq!(*recorder.0.lock().unwrap(), vec!["absences_flagged"]);
        assert_eq!(bus.handler_names(), vec!["failing", "recorder"]);
    }
}
