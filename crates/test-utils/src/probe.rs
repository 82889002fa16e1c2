use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rundag::dag::{TaskContext, TaskDescriptor};
use serde_json::Value;

use crate::builders::FAST_BACKOFF;

/// Start/end instants of one observed task.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: Instant,
    pub end: Instant,
}

#[derive(Debug, Default)]
struct ProbeState {
    in_flight: usize,
    max_in_flight: usize,
    spans: HashMap<String, Span>,
    order: Vec<String>,
}

/// Records how many probed tasks run at once and when each ran.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A descriptor whose work holds a slot in the probe for `hold`.
    pub fn task(&self, id: &str, hold: Duration) -> TaskDescriptor {
        let probe = self.clone();
        TaskDescriptor::new(id, move |ctx: TaskContext| {
            let probe = probe.clone();
            async move {
                let start = probe.enter(ctx.task_id());
                tokio::time::sleep(hold).await;
                probe.leave(ctx.task_id(), start);
                Ok::<_, anyhow::Error>(Value::Null)
            }
        })
        .base_backoff(FAST_BACKOFF)
        .max_backoff(FAST_BACKOFF)
    }

    fn enter(&self, id: &str) -> Instant {
        let mut s = self.state.lock().unwrap();
        s.in_flight += 1;
        s.max_in_flight = s.max_in_flight.max(s.in_flight);
        s.order.push(id.to_string());
        Instant::now()
    }

    fn leave(&self, id: &str, start: Instant) {
        let end = Instant::now();
        let mut s = self.state.lock().unwrap();
        s.in_flight -= 1;
        s.spans.insert(id.to_string(), Span { start, end });
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn span(&self, id: &str) -> Option<Span> {
        self.state.lock().unwrap().spans.get(id).copied()
    }

    /// Task ids in the order their work started.
    pub fn start_order(&self) -> Vec<String> {
        self.state.lock().unwrap().order.clone()
    }

    pub fn ran(&self, id: &str) -> bool {
        self.state.lock().unwrap().order.iter().any(|o| o == id)
    }
}
