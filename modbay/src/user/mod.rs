//! Presentation collaborator.
//!
//! The core never prints; progress and messages go through this trait so the
//! CLI and GUI can render them however they like.

/// Sink for user-facing messages and progress.
pub trait User: Send + Sync {
    /// Informational message.
    fn raise_message(&self, text: &str);

    /// Progress update; `percent` is 0..=100.
    fn raise_progress(&self, text: &str, percent: u8);

    /// Non-fatal error worth showing even in quiet modes.
    fn raise_error(&self, text: &str);
}

/// Discards everything. Useful for tests and headless callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUser;

impl User for NullUser {
    fn raise_message(&self, _text: &str) {}
    fn raise_progress(&self, _text: &str, _percent: u8) {}
    fn raise_error(&self, _text: &str) {}
}

#[cfg(test)]
pub mod test_support {
    use super::User;
    use std::sync::Mutex;

    /// Records everything raised, for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingUser {
        pub messages: Mutex<Vec<String>>,
        pub progress: Mutex<Vec<(String, u8)>>,
        pub errors: Mutex<Vec<String>>,
    }

    impl User for RecordingUser {
        fn raise_message(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }

        fn raise_progress(&self, text: &str, percent: u8) {
            self.progress
                .lock()
                .unwrap()
                .push((text.to_string(), percent));
        }

        fn raise_error(&self, text: &str) {
            self.errors.lock().unwrap().push(text.to_string());
        }
    }
}
