//! [`RtcProvider`] backed by the LiveKit Rust SDK.
//!
//! The application id picks the server through [`LiveKitConfig::url_template`].
//! The channel name only matters when no token is given: a development token
//! granting `room_join` on that channel is minted from the configured API
//! key/secret.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};

use futures_util::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::{LocalTrackPublication, Room, RoomEvent, RoomOptions};
use livekit::track::{LocalAudioTrack, LocalTrack, RemoteTrack, TrackSource as LkTrackSource};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit::webrtc::prelude::{AudioSourceOptions, RtcAudioSource};
use livekit_api::access_token::{AccessToken, VideoGrants};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::LiveKitConfig;
use crate::errors::CallError;
use crate::params::JoinRequest;
use crate::playout::PlayoutMixer;
use crate::provider::{
    CaptureOptions, MicrophoneCapture, RemoteAudioTrack, RemoteParticipant, RtcProvider,
};

/// Audio source options matching the LiveKit defaults.
const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

type PlaybackTasks = Arc<StdMutex<HashMap<String, JoinHandle<()>>>>;

/// Where a capture is currently published.
struct Published {
    room: Weak<Room>,
    publication: LocalTrackPublication,
}

/// Local microphone track. Native capture code feeds PCM into [`Self::source`].
pub struct LiveKitCapture {
    source: NativeAudioSource,
    track: LocalAudioTrack,
    published: StdMutex<Option<Published>>,
    monitor_volume: AtomicU8,
    closed: AtomicBool,
}

impl LiveKitCapture {
    pub fn source(&self) -> &NativeAudioSource {
        &self.source
    }

    /// LiveKit never plays local capture back; the level is kept for hosts
    /// that run their own monitor.
    pub fn monitor_volume(&self) -> u8 {
        self.monitor_volume.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_published(&self) -> Option<Published> {
        self.published.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

impl MicrophoneCapture for LiveKitCapture {
    fn set_volume(&self, level: u8) {
        self.monitor_volume.store(level.min(100), Ordering::SeqCst);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("microphone capture closed");

        // Still on air: pull the track from the room it was published to.
        let Some(Published { room, publication }) = self.take_published() else {
            return;
        };
        let Some(room) = room.upgrade() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let sid = publication.sid();
                    if let Err(e) = room.local_participant().unpublish_track(&sid).await {
                        tracing::warn!("unpublish on close failed: {e}");
                    }
                });
            }
            Err(_) => tracing::warn!("capture closed outside a runtime, track left published"),
        }
    }
}

/// Remote audio track; playing it streams decoded PCM into the shared mixer.
#[derive(Clone)]
pub struct LiveKitRemoteTrack {
    track: livekit::track::RemoteAudioTrack,
    mixer: Arc<PlayoutMixer>,
    playback: PlaybackTasks,
}

impl RemoteAudioTrack for LiveKitRemoteTrack {
    fn id(&self) -> String {
        self.track.sid().to_string()
    }

    fn play(&self) {
        let sid = self.id();
        let mut audio_stream = NativeAudioStream::new(self.track.rtc_track(), 48_000, 1);
        let mixer = self.mixer.clone();
        let source = sid.clone();
        let handle = tokio::spawn(async move {
            tracing::info!("audio playout stream started for track {source}");
            while let Some(frame) = audio_stream.next().await {
                mixer.push(&source, &frame.data);
            }
            mixer.remove(&source);
            tracing::info!("audio playout stream ended for track {source}");
        });

        let mut tasks = self.playback.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = tasks.insert(sid, handle) {
            previous.abort();
        }
    }
}

pub struct LiveKitProvider {
    config: LiveKitConfig,
    room: RwLock<Option<Arc<Room>>>,
    connected: Arc<AtomicBool>,
    mixer: Arc<PlayoutMixer>,
    playback: PlaybackTasks,
    events_task: StdMutex<Option<JoinHandle<()>>>,
}

impl LiveKitProvider {
    pub fn new(config: LiveKitConfig) -> Self {
        Self {
            config,
            room: RwLock::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            mixer: Arc::new(PlayoutMixer::new()),
            playback: Arc::new(StdMutex::new(HashMap::new())),
            events_task: StdMutex::new(None),
        }
    }

    /// Mixed remote audio for the platform output to pull from.
    pub fn mixer(&self) -> Arc<PlayoutMixer> {
        self.mixer.clone()
    }

    fn current_room(&self) -> Option<Arc<Room>> {
        self.room
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn token_for(&self, request: &JoinRequest) -> Result<String, CallError> {
        if let Some(token) = &request.token {
            return Ok(token.clone());
        }

        let (key, secret) = self.config.api_credentials().ok_or_else(|| {
            CallError::Provider("no token given and no API key configured".into())
        })?;
        let identity = self
            .config
            .identity
            .clone()
            .unwrap_or_else(|| format!("guest-{}", Uuid::new_v4()));
        tracing::info!("minting development token for {identity} in {}", request.channel_name);

        AccessToken::with_api_key(key, secret)
            .with_identity(&identity)
            .with_grants(VideoGrants {
                room_join: true,
                room: request.channel_name.clone(),
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| CallError::Provider(format!("mint token: {e}")))
    }

    fn stop_playback(&self) {
        let mut tasks = self.playback.lock().unwrap_or_else(|p| p.into_inner());
        for (sid, handle) in tasks.drain() {
            handle.abort();
            tracing::debug!("audio playout stream aborted: {sid}");
        }
        self.mixer.clear();
    }

    async fn event_loop(mut events: UnboundedReceiver<RoomEvent>, connected: Arc<AtomicBool>) {
        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason:?}");
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
                RoomEvent::Reconnecting => {
                    connected.store(false, Ordering::SeqCst);
                }
                RoomEvent::Reconnected => {
                    connected.store(true, Ordering::SeqCst);
                }
                RoomEvent::ParticipantConnected(participant) => {
                    tracing::info!("participant joined: {}", participant.identity());
                }
                RoomEvent::ParticipantDisconnected(participant) => {
                    tracing::info!("participant left: {}", participant.identity());
                }
                _ => {
                    tracing::debug!("unhandled room event: {event:?}");
                }
            }
        }
        tracing::info!("room event loop ended");
    }
}

impl RtcProvider for LiveKitProvider {
    type Capture = LiveKitCapture;
    type RemoteTrack = LiveKitRemoteTrack;

    async fn join(&self, request: JoinRequest) -> Result<(), CallError> {
        let url = self.config.server_url(&request.application_id)?;
        let token = self.token_for(&request)?;

        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        tracing::info!("connecting to {url}");
        let (room, events) = Room::connect(&url, &token, options)
            .await
            .map_err(|e| CallError::Provider(e.to_string()))?;

        let previous = self
            .room
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .replace(Arc::new(room));
        if let Some(previous) = previous {
            tracing::warn!("joined while still in a room, closing the old one");
            self.stop_playback();
            if let Err(e) = previous.close().await {
                tracing::warn!("error closing previous room: {e}");
            }
        }
        self.connected.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(Self::event_loop(events, self.connected.clone()));
        if let Some(previous) = self
            .events_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(handle)
        {
            previous.abort();
        }
        Ok(())
    }

    async fn leave(&self) {
        let room = self.room.write().unwrap_or_else(|p| p.into_inner()).take();
        self.connected.store(false, Ordering::SeqCst);
        self.stop_playback();

        if let Some(room) = room {
            if let Err(e) = room.close().await {
                tracing::warn!("error closing room: {e}");
            }
        }
        if let Some(task) = self.events_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, capture: &LiveKitCapture) -> Result<(), CallError> {
        let room = self
            .current_room()
            .ok_or_else(|| CallError::Provider("not connected".into()))?;

        let publication = room
            .local_participant()
            .publish_track(
                LocalTrack::Audio(capture.track.clone()),
                TrackPublishOptions {
                    source: LkTrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| CallError::Provider(format!("publish audio: {e}")))?;

        *capture.published.lock().unwrap_or_else(|p| p.into_inner()) = Some(Published {
            room: Arc::downgrade(&room),
            publication,
        });
        Ok(())
    }

    async fn unpublish(&self, capture: &LiveKitCapture) -> Result<(), CallError> {
        let Some(Published { room, publication }) = capture.take_published() else {
            return Ok(());
        };
        // Published to a room that has since been closed: nothing to undo.
        let Some(room) = room.upgrade() else {
            return Ok(());
        };

        room.local_participant()
            .unpublish_track(&publication.sid())
            .await
            .map_err(|e| CallError::Provider(format!("unpublish audio: {e}")))?;
        Ok(())
    }

    fn remote_participants(&self) -> Vec<RemoteParticipant<LiveKitRemoteTrack>> {
        let Some(room) = self.current_room() else {
            return Vec::new();
        };

        room.remote_participants()
            .into_iter()
            .map(|(identity, participant)| {
                let audio_track = participant
                    .track_publications()
                    .values()
                    .find_map(|publication| match publication.track() {
                        Some(RemoteTrack::Audio(track)) => Some(LiveKitRemoteTrack {
                            track,
                            mixer: self.mixer.clone(),
                            playback: self.playback.clone(),
                        }),
                        _ => None,
                    });
                RemoteParticipant {
                    id: identity.to_string(),
                    audio_track,
                }
            })
            .collect()
    }

    async fn create_microphone_capture(
        &self,
        options: CaptureOptions,
    ) -> Result<LiveKitCapture, CallError> {
        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: options.echo_cancellation,
                noise_suppression: options.noise_suppression,
                auto_gain_control: options.auto_gain_control,
            },
            AUDIO_SAMPLE_RATE,
            AUDIO_CHANNELS,
            AUDIO_QUEUE_SIZE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            "microphone",
            RtcAudioSource::Native(source.clone()),
        );

        tracing::info!("microphone capture created");
        Ok(LiveKitCapture {
            source,
            track,
            published: StdMutex::new(None),
            monitor_volume: AtomicU8::new(100),
            closed: AtomicBool::new(false),
        })
    }
}
