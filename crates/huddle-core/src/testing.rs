//! In-memory provider used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::errors::CallError;
use crate::params::JoinRequest;
use crate::provider::{
    CaptureOptions, MicrophoneCapture, RemoteAudioTrack, RemoteParticipant, RtcProvider,
};

/// Shared view of one capture handed out by [`FakeProvider`].
#[derive(Debug)]
pub struct CaptureRecord {
    pub id: usize,
    pub volume: Mutex<Option<u8>>,
    pub closed: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

impl CaptureRecord {
    pub fn volume(&self) -> Option<u8> {
        *self.volume.lock().unwrap()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeCapture {
    record: Arc<CaptureRecord>,
}

impl MicrophoneCapture for FakeCapture {
    fn set_volume(&self, level: u8) {
        *self.record.volume.lock().unwrap() = Some(level);
        self.record.log.lock().unwrap().push(format!("volume {} {level}", self.record.id));
    }

    fn close(&self) {
        self.record.closed.fetch_add(1, Ordering::SeqCst);
        self.record.log.lock().unwrap().push(format!("close {}", self.record.id));
    }
}

#[derive(Clone)]
pub struct FakeTrack {
    id: String,
    plays: Arc<AtomicUsize>,
}

impl FakeTrack {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            plays: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl RemoteAudioTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every call and lets tests decide when the microphone resolves.
#[derive(Default)]
pub struct FakeProvider {
    pub joins: Mutex<Vec<JoinRequest>>,
    pub leaves: AtomicUsize,
    pub connected: AtomicBool,
    pub fail_microphone: AtomicBool,
    pub fail_join: AtomicBool,
    pub participants: Mutex<Vec<RemoteParticipant<FakeTrack>>>,
    pub captures: Mutex<Vec<Arc<CaptureRecord>>>,
    pub capture_options: Mutex<Vec<CaptureOptions>>,
    log: Arc<Mutex<Vec<String>>>,
    mic_gate: Mutex<Option<oneshot::Receiver<()>>>,
    join_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next microphone request waits until the returned sender fires.
    pub fn hold_microphone(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.mic_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// The next join waits until the returned sender fires.
    pub fn hold_join(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.join_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn set_participants(&self, participants: Vec<RemoteParticipant<FakeTrack>>) {
        *self.participants.lock().unwrap() = participants;
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn capture(&self, index: usize) -> Arc<CaptureRecord> {
        self.captures.lock().unwrap()[index].clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.lock().unwrap().len()
    }

    pub fn open_captures(&self) -> usize {
        self.captures
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.close_count() == 0)
            .count()
    }

    pub fn join_requests(&self) -> Vec<JoinRequest> {
        self.joins.lock().unwrap().clone()
    }

    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl RtcProvider for FakeProvider {
    type Capture = FakeCapture;
    type RemoteTrack = FakeTrack;

    async fn join(&self, request: JoinRequest) -> Result<(), CallError> {
        self.joins.lock().unwrap().push(request);
        let gate = self.join_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.record("join".to_string());
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(CallError::Provider("join refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn leave(&self) {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.record("leave".to_string());
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, capture: &FakeCapture) -> Result<(), CallError> {
        self.record(format!("publish {}", capture.record.id));
        Ok(())
    }

    async fn unpublish(&self, capture: &FakeCapture) -> Result<(), CallError> {
        self.record(format!("unpublish {}", capture.record.id));
        Ok(())
    }

    fn remote_participants(&self) -> Vec<RemoteParticipant<FakeTrack>> {
        self.participants.lock().unwrap().clone()
    }

    async fn create_microphone_capture(
        &self,
        options: CaptureOptions,
    ) -> Result<FakeCapture, CallError> {
        self.capture_options.lock().unwrap().push(options);
        let gate = self.mic_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_microphone.load(Ordering::SeqCst) {
            return Err(CallError::Microphone("permission denied".to_string()));
        }

        let mut captures = self.captures.lock().unwrap();
        let record = Arc::new(CaptureRecord {
            id: captures.len(),
            volume: Mutex::new(None),
            closed: AtomicUsize::new(0),
            log: self.log.clone(),
        });
        captures.push(record.clone());
        drop(captures);
        self.record(format!("create {}", record.id));
        Ok(FakeCapture { record })
    }
}
