use std::sync::{Arc, RwLock};

/// Events emitted by the call session to UI listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    CallStateChanged(CallState),
    MicrophoneAcquired,
    MicrophoneFailed(String),
    MicrophoneReleased,
    MicrophonePublished,
    MicrophoneUnpublished,
    RemoteTrackStarted { participant_id: String, track_id: String },
}

/// Whether the user asked to be in a call.
///
/// `Calling` covers both "join in progress" and "joined"; the provider's
/// [`ConnectionStatus`] tells the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Calling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    NotConnected,
}

impl From<bool> for ConnectionStatus {
    fn from(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::NotConnected
        }
    }
}

/// Trait for receiving events from the session.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait CallEventListener: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

/// Dispatches events to every registered listener.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn CallEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn emit(&self, event: CallEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EventCapture {
        events: Arc<Mutex<Vec<CallEvent>>>,
    }

    impl CallEventListener for EventCapture {
        fn on_event(&self, event: CallEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn every_listener_sees_each_event() {
        let emitter = EventEmitter::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        emitter.add_listener(Arc::new(EventCapture { events: first.clone() }));
        emitter.add_listener(Arc::new(EventCapture { events: second.clone() }));

        emitter.emit(CallEvent::CallStateChanged(CallState::Calling));
        emitter.emit(CallEvent::MicrophoneAcquired);

        let expected = vec![
            CallEvent::CallStateChanged(CallState::Calling),
            CallEvent::MicrophoneAcquired,
        ];
        assert_eq!(*first.lock().unwrap(), expected);
        assert_eq!(*second.lock().unwrap(), expected);
    }

    #[test]
    fn emit_without_listeners_is_fine() {
        EventEmitter::new().emit(CallEvent::MicrophoneReleased);
    }

    #[test]
    fn connection_status_from_bool() {
        assert_eq!(ConnectionStatus::from(true), ConnectionStatus::Connected);
        assert_eq!(ConnectionStatus::from(false), ConnectionStatus::NotConnected);
    }
}
