//! Voice side channel for the assistant.
//!
//! Speech recognizers stop on their own (silence, errors, platform limits),
//! so the controller tracks whether the user *wants* to listen separately
//! from whether the recognizer is *actually* running. Automatic restarts only
//! happen while listening is still desired.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delay before restarting after the recognizer ended normally.
pub const RESTART_AFTER_END: Duration = Duration::from_millis(250);
/// Delay before restarting after a recognizer error.
pub const RESTART_AFTER_ERROR: Duration = Duration::from_millis(400);

pub trait Recognizer: Send + Sync {
    fn start(&self) -> Result<(), String>;
    fn stop(&self);
}

/// Receives answers when voice output is enabled.
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str);
}

pub struct ListeningController {
    recognizer: Arc<dyn Recognizer>,
    desired: AtomicBool,
    active: AtomicBool,
}

impl ListeningController {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            recognizer,
            desired: AtomicBool::new(false),
            active: AtomicBool::new(false),
        }
    }

    pub fn is_desired(&self) -> bool {
        self.desired.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        self.desired.store(true, Ordering::SeqCst);
        self.start_recognizer();
    }

    /// Explicit stop. Clears the desired flag so no pending restart fires.
    pub fn stop(&self) {
        self.desired.store(false, Ordering::SeqCst);
        self.stop_recognizer();
    }

    pub fn on_started(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Recognizer ended by itself. Returns the restart delay if a restart is wanted.
    pub fn on_ended(&self) -> Option<Duration> {
        self.active.store(false, Ordering::SeqCst);
        self.is_desired().then_some(RESTART_AFTER_END)
    }

    pub fn on_error(&self, error: &str) -> Option<Duration> {
        warn!(error = error, "Speech recognizer error");
        self.active.store(false, Ordering::SeqCst);
        self.is_desired().then_some(RESTART_AFTER_ERROR)
    }

    /// Restart if listening is still desired and nothing is running.
    pub fn restart_if_desired(&self) -> bool {
        if !self.is_desired() || self.is_active() {
            return false;
        }
        self.start_recognizer()
    }

    pub fn schedule_restart(self: &Arc<Self>, delay: Duration) -> JoinHandle<bool> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.restart_if_desired()
        })
    }

    /// Pause listening while `speaker` reads `text`, then resume if listening
    /// was desired before speaking.
    pub fn speak_with(&self, speaker: &dyn Speaker, text: &str) {
        let was_desired = self.is_desired();
        if was_desired {
            self.desired.store(false, Ordering::SeqCst);
            self.stop_recognizer();
        }

        speaker.speak(text);

        if was_desired {
            self.start();
        }
    }

    fn start_recognizer(&self) -> bool {
        match self.recognizer.start() {
            Ok(()) => {
                self.active.store(true, Ordering::SeqCst);
                debug!("Speech recognizer started");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to start speech recognizer");
                false
            }
        }
    }

    fn stop_recognizer(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.recognizer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRecognizer {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail: AtomicBool,
    }

    impl Recognizer for FakeRecognizer {
        fn start(&self) -> Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("not-allowed".into());
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingSpeaker {
        spoken: Mutex<Vec<String>>,
        controller: Arc<ListeningController>,
        active_while_speaking: AtomicBool,
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&self, text: &str) {
            self.active_while_speaking
                .store(self.controller.is_active(), Ordering::SeqCst);
            self.spoken.lock().unwrap().push(text.to_string());
        }
    }

    fn controller() -> (Arc<FakeRecognizer>, Arc<ListeningController>) {
        let recognizer = Arc::new(FakeRecognizer::default());
        let controller = Arc::new(ListeningController::new(recognizer.clone()));
        (recognizer, controller)
    }

    #[test]
    fn test_auto_restart_only_while_desired() {
        let (recognizer, controller) = controller();
        controller.start();
        assert_eq!(controller.on_ended(), Some(RESTART_AFTER_END));
        assert!(controller.restart_if_desired());
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 2);

        controller.stop();
        assert_eq!(controller.on_ended(), None);
        assert_eq!(controller.on_error("network"), None);
        assert!(!controller.restart_if_desired());
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_uses_longer_delay() {
        let (_, controller) = controller();
        controller.start();
        assert_eq!(controller.on_error("no-speech"), Some(RESTART_AFTER_ERROR));
    }

    #[test]
    fn test_start_failure_leaves_inactive() {
        let (recognizer, controller) = controller();
        recognizer.fail.store(true, Ordering::SeqCst);
        controller.start();
        assert!(controller.is_desired());
        assert!(!controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_delay_prevents_restart() {
        let (recognizer, controller) = controller();
        controller.start();
        let delay = controller.on_ended().unwrap();
        let pending = controller.schedule_restart(delay);

        controller.stop();
        assert!(!pending.await.unwrap());
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
        assert!(!controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_restart_fires_when_desired() {
        let (recognizer, controller) = controller();
        controller.start();
        let delay = controller.on_error("aborted").unwrap();
        assert!(controller.schedule_restart(delay).await.unwrap());
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_speaking_pauses_and_resumes() {
        let (recognizer, controller) = controller();
        let speaker = RecordingSpeaker {
            spoken: Mutex::new(Vec::new()),
            controller: controller.clone(),
            active_while_speaking: AtomicBool::new(true),
        };

        controller.start();
        controller.speak_with(&speaker, "Move to higher ground.");
        assert!(!speaker.active_while_speaking.load(Ordering::SeqCst));
        assert!(controller.is_desired());
        assert!(controller.is_active());
        assert_eq!(recognizer.stops.load(Ordering::SeqCst), 1);

        controller.stop();
        controller.speak_with(&speaker, "Stay low.");
        assert!(!controller.is_desired());
        assert_eq!(speaker.spoken.lock().unwrap().len(), 2);
    }
}
