use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::CallConfig;
use crate::errors::CallError;
use crate::events::{CallEvent, CallEventListener, CallState, ConnectionStatus, EventEmitter};
use crate::params::{ConnectionParameters, JoinRequest, ParameterUpdate};
use crate::playback::PlaybackTracker;
use crate::provider::{MicrophoneCapture, RemoteParticipant, RtcProvider};

/// Local playback level of a fresh capture, so users never hear themselves.
const LOCAL_MONITOR_VOLUME: u8 = 0;

/// Microphone status for the mute button and the local tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrophoneState {
    /// The user's mute toggle.
    pub enabled: bool,
    /// A capture resource is held.
    pub acquired: bool,
    /// The capture is audible to the channel.
    pub published: bool,
    /// Last acquisition failure in the current call.
    pub error: Option<String>,
}

/// Everything a render pass needs.
#[derive(Debug, Clone)]
pub struct CallView<T> {
    pub call_state: CallState,
    pub connection: ConnectionStatus,
    pub can_start_call: bool,
    pub microphone: MicrophoneState,
    pub participants: Vec<RemoteParticipant<T>>,
}

/// Sole owner of a capture resource. Dropping it closes the resource.
struct CaptureGuard<C: MicrophoneCapture> {
    capture: C,
}

impl<C: MicrophoneCapture> Drop for CaptureGuard<C> {
    fn drop(&mut self) {
        self.capture.close();
    }
}

struct SessionInner<P: RtcProvider> {
    params: ConnectionParameters,
    state: CallState,
    /// Identifies the current Calling period; stale async results compare against it.
    call_id: Option<Uuid>,
    joined: bool,
    mic_enabled: bool,
    capture: Option<CaptureGuard<P::Capture>>,
    published: bool,
    mic_error: Option<String>,
    playback: PlaybackTracker,
}

impl<P: RtcProvider> SessionInner<P> {
    fn is_current(&self, call_id: Uuid) -> bool {
        self.state == CallState::Calling && self.call_id == Some(call_id)
    }

    fn microphone_state(&self) -> MicrophoneState {
        MicrophoneState {
            enabled: self.mic_enabled,
            acquired: self.capture.is_some(),
            published: self.published,
            error: self.mic_error.clone(),
        }
    }
}

struct Shared<P: RtcProvider> {
    provider: Arc<P>,
    config: CallConfig,
    emitter: EventEmitter,
    inner: Mutex<SessionInner<P>>,
    /// Held for the whole of a provider join, so joins complete in call order.
    join_turn: Mutex<()>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl<P: RtcProvider> Drop for Shared<P> {
    fn drop(&mut self) {
        if self.inner.get_mut().state != CallState::Calling {
            return;
        }
        // Torn down mid-call: the capture closes with `inner`, the connection needs a leave.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let provider = self.provider.clone();
                handle.spawn(async move {
                    provider.leave().await;
                });
                tracing::info!("session dropped while calling, leaving channel");
            }
            Err(_) => tracing::warn!("session dropped while calling outside a runtime"),
        }
    }
}

/// Drives one voice call at a time on top of an [`RtcProvider`].
///
/// UI intents (`set_parameters`, `start_call`, `toggle_mic`, `end_call`) are
/// discrete state transitions. Joining and microphone acquisition run in the
/// background; their results are dropped or undone when the call they
/// belong to has already ended.
pub struct CallSession<P: RtcProvider> {
    shared: Arc<Shared<P>>,
}

impl<P: RtcProvider> CallSession<P> {
    pub fn new(provider: Arc<P>, config: CallConfig) -> Self {
        let inner = SessionInner {
            params: ConnectionParameters::default(),
            state: CallState::Idle,
            call_id: None,
            joined: false,
            mic_enabled: config.mic_enabled_on_start,
            capture: None,
            published: false,
            mic_error: None,
            playback: PlaybackTracker::new(),
        };
        Self {
            shared: Arc::new(Shared {
                provider,
                config,
                emitter: EventEmitter::new(),
                inner: Mutex::new(inner),
                join_turn: Mutex::new(()),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.shared.emitter.add_listener(listener);
    }

    pub async fn set_parameters(&self, update: ParameterUpdate) {
        self.shared.inner.lock().await.params.apply(update);
    }

    pub async fn parameters(&self) -> ConnectionParameters {
        self.shared.inner.lock().await.params.clone()
    }

    /// Whether the join action should be offered.
    pub async fn can_start_call(&self) -> bool {
        let inner = self.shared.inner.lock().await;
        inner.state == CallState::Idle && inner.params.is_complete()
    }

    pub async fn call_state(&self) -> CallState {
        self.shared.inner.lock().await.state
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared.provider.is_connected().into()
    }

    pub async fn microphone_state(&self) -> MicrophoneState {
        self.shared.inner.lock().await.microphone_state()
    }

    /// Enter the Calling state and ask the provider to join.
    ///
    /// Fails without side effects when a required parameter is blank.
    /// Calling it again while already Calling does nothing.
    pub async fn start_call(&self) -> Result<(), CallError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state == CallState::Calling {
            tracing::debug!("start_call ignored: already calling");
            return Ok(());
        }

        let request = inner.params.to_join_request()?;
        let call_id = Uuid::new_v4();
        inner.state = CallState::Calling;
        inner.call_id = Some(call_id);
        inner.joined = false;
        inner.published = false;
        inner.mic_error = None;
        drop(inner);

        tracing::info!(
            %call_id,
            channel = %request.channel_name,
            has_token = request.token.is_some(),
            "starting call"
        );
        self.shared
            .emitter
            .emit(CallEvent::CallStateChanged(CallState::Calling));

        self.spawn(Shared::join(self.shared.clone(), call_id, request));
        self.spawn(Shared::acquire_microphone(self.shared.clone(), call_id));
        Ok(())
    }

    /// Flip the mute toggle and return the new value.
    ///
    /// Muting unpublishes the capture but keeps it open; unmuting while in a
    /// joined call publishes it again. The call state is never touched.
    pub async fn toggle_mic(&self) -> bool {
        let mut inner = self.shared.inner.lock().await;
        inner.mic_enabled = !inner.mic_enabled;
        let enabled = inner.mic_enabled;
        tracing::info!("microphone enabled: {enabled}");

        if enabled {
            self.shared.publish_if_ready(&mut inner).await;
        } else {
            self.shared.unpublish_if_published(&mut inner).await;
        }
        enabled
    }

    /// Hang up: back to Idle, close the microphone, leave the channel.
    pub async fn end_call(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state == CallState::Idle {
            tracing::debug!("end_call ignored: not calling");
            return;
        }

        let call_id = inner.call_id.take();
        inner.state = CallState::Idle;
        inner.joined = false;
        inner.published = false;
        inner.playback.clear();
        let capture = inner.capture.take();

        tracing::info!(?call_id, "ending call");
        self.shared
            .emitter
            .emit(CallEvent::CallStateChanged(CallState::Idle));

        if let Some(guard) = capture {
            drop(guard);
            tracing::debug!("microphone released");
            self.shared.emitter.emit(CallEvent::MicrophoneReleased);
        }
        self.shared.provider.leave().await;
    }

    /// Current remote participants, starting playback of any audio track
    /// not played yet. Empty while Idle.
    pub async fn remote_participants(&self) -> Vec<RemoteParticipant<P::RemoteTrack>> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != CallState::Calling {
            return Vec::new();
        }

        let participants = self.shared.provider.remote_participants();
        for started in inner.playback.refresh(&participants) {
            self.shared.emitter.emit(CallEvent::RemoteTrackStarted {
                participant_id: started.participant_id,
                track_id: started.track_id,
            });
        }
        participants
    }

    pub async fn snapshot(&self) -> CallView<P::RemoteTrack> {
        let participants = self.remote_participants().await;
        let inner = self.shared.inner.lock().await;
        CallView {
            call_state: inner.state,
            connection: self.connection_status(),
            can_start_call: inner.state == CallState::Idle && inner.params.is_complete(),
            microphone: inner.microphone_state(),
            participants,
        }
    }

    /// Wait for background join and acquisition work to finish.
    pub async fn settle(&self) {
        loop {
            let pending = {
                let mut tasks = self
                    .shared
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::warn!("session task failed: {e}");
                }
            }
        }
    }

    /// Tear the session down, releasing the microphone on every path.
    pub async fn shutdown(&self) {
        self.end_call().await;
        self.settle().await;
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(task);
        let mut tasks = self
            .shared
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }
}

impl<P: RtcProvider> Shared<P> {
    async fn join(self: Arc<Self>, call_id: Uuid, request: JoinRequest) {
        // No newer join can start before this one is settled, so a stale
        // connection is always the provider's latest and safe to leave.
        let _turn = self.join_turn.lock().await;
        if !self.inner.lock().await.is_current(call_id) {
            tracing::debug!(%call_id, "call ended before its join started, skipping");
            return;
        }

        let result = self.provider.join(request).await;
        let mut inner = self.inner.lock().await;

        match result {
            Ok(()) if inner.is_current(call_id) => {
                tracing::info!(%call_id, "joined channel");
                inner.joined = true;
                self.publish_if_ready(&mut inner).await;
            }
            Ok(()) => {
                tracing::info!(%call_id, "join completed after hang-up, leaving");
                self.provider.leave().await;
            }
            Err(e) => {
                tracing::warn!(%call_id, "join failed: {e}");
            }
        }
    }

    async fn acquire_microphone(self: Arc<Self>, call_id: Uuid) {
        let options = self.config.capture.clone();
        tracing::debug!(%call_id, ?options, "requesting microphone");

        match self.provider.create_microphone_capture(options).await {
            Ok(capture) => {
                capture.set_volume(LOCAL_MONITOR_VOLUME);
                let guard = CaptureGuard { capture };

                let mut inner = self.inner.lock().await;
                if !inner.is_current(call_id) {
                    tracing::info!(%call_id, "microphone resolved after hang-up, closing it");
                    drop(guard);
                    return;
                }
                if inner.capture.is_some() {
                    tracing::warn!(%call_id, "microphone already held, closing duplicate");
                    drop(guard);
                    return;
                }

                inner.capture = Some(guard);
                inner.mic_error = None;
                tracing::info!(%call_id, "microphone acquired");
                self.emitter.emit(CallEvent::MicrophoneAcquired);
                self.publish_if_ready(&mut inner).await;
            }
            Err(e) => {
                let mut inner = self.inner.lock().await;
                if !inner.is_current(call_id) {
                    tracing::debug!(%call_id, "microphone failed after hang-up: {e}");
                    return;
                }
                tracing::warn!(%call_id, "microphone acquisition failed: {e}");
                let message = e.to_string();
                inner.mic_error = Some(message.clone());
                self.emitter.emit(CallEvent::MicrophoneFailed(message));
            }
        }
    }

    async fn publish_if_ready(&self, inner: &mut SessionInner<P>) {
        if !inner.joined || !inner.mic_enabled || inner.published {
            return;
        }
        let Some(guard) = inner.capture.as_ref() else {
            return;
        };

        let result = self.provider.publish(&guard.capture).await;
        match result {
            Ok(()) => {
                inner.published = true;
                tracing::info!("microphone track published");
                self.emitter.emit(CallEvent::MicrophonePublished);
            }
            Err(e) => tracing::warn!("publish microphone: {e}"),
        }
    }

    async fn unpublish_if_published(&self, inner: &mut SessionInner<P>) {
        if !inner.published {
            return;
        }
        let Some(guard) = inner.capture.as_ref() else {
            return;
        };

        let result = self.provider.unpublish(&guard.capture).await;
        match result {
            Ok(()) => {
                inner.published = false;
                tracing::info!("microphone track unpublished");
                self.emitter.emit(CallEvent::MicrophoneUnpublished);
            }
            Err(e) => tracing::warn!("unpublish microphone: {e}"),
        }
    }
}
