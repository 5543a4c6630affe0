// Listener collecting what a `quarry run` session saw

use async_trait::async_trait;
use clap::ValueEnum;
use parking_lot::Mutex;
use quarry_eye::{FrameListener, SettleEvent};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Report settled classes only
    Detect,
    /// Also collect every distinct class observed in any frame
    Learning,
}

pub struct SessionListener {
    mode: Mode,
    seen: Mutex<BTreeSet<String>>,
    settled: Mutex<Vec<SettleEvent>>,
}

impl SessionListener {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            seen: Mutex::new(BTreeSet::new()),
            settled: Mutex::new(Vec::new()),
        }
    }

    /// Distinct classes observed so far, sorted by name
    pub fn seen_classes(&self) -> Vec<String> {
        self.seen.lock().iter().cloned().collect()
    }

    pub fn settled(&self) -> Vec<SettleEvent> {
        self.settled.lock().clone()
    }
}

#[async_trait]
impl FrameListener for SessionListener {
    async fn on_settle(&self, event: &SettleEvent) {
        info!(
            "Object present: {} ({} hits, {})",
            event.class_name,
            event.count,
            event.at.to_rfc3339()
        );
        self.settled.lock().push(event.clone());
    }

    fn on_frame_observations(&self, class_names: &[String]) {
        if self.mode != Mode::Learning {
            return;
        }
        let mut seen = self.seen.lock();
        for name in class_names {
            if seen.insert(name.clone()) {
                info!("New class observed: {}", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> SettleEvent {
        SettleEvent {
            class_name: name.to_string(),
            class_id: 0,
            count: 21,
            at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_learning_mode_collects_distinct_classes() {
        let listener = SessionListener::new(Mode::Learning);
        listener.on_frame_observations(&["dog".to_string(), "cat".to_string()]);
        listener.on_frame_observations(&["cat".to_string()]);
        assert_eq!(listener.seen_classes(), vec!["cat", "dog"]);
    }

    #[test]
    fn test_detect_mode_ignores_observations() {
        let listener = SessionListener::new(Mode::Detect);
        listener.on_frame_observations(&["cat".to_string()]);
        assert!(listener.seen_classes().is_empty());
    }

    #[test]
    fn test_settle_events_recorded() {
        let listener = SessionListener::new(Mode::Detect);
        tokio_test::block_on(listener.on_settle(&event("cat")));
        tokio_test::block_on(listener.on_settle(&event("dog")));
        let names: Vec<String> = listener.settled().into_iter().map(|e| e.class_name).collect();
        assert_eq!(names, vec!["cat", "dog"]);
    }
}
