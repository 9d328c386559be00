//! The seam between the call session and the RTC SDK doing the real work.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::errors::CallError;
use crate::params::JoinRequest;

#[cfg(feature = "livekit")]
pub mod livekit;

/// Audio processing requested from the platform when opening the microphone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A local microphone stream handle.
pub trait MicrophoneCapture: Send + Sync + 'static {
    /// Local playback level, 0..=100.
    fn set_volume(&self, level: u8);
    /// Stop capturing and free the device.
    fn close(&self);
}

/// Audio track of another channel member.
pub trait RemoteAudioTrack: Clone + Send + Sync + 'static {
    /// Changes whenever the SDK swaps the underlying track.
    fn id(&self) -> String;
    fn play(&self);
}

/// Another member of the channel, as currently known by the provider.
#[derive(Debug, Clone)]
pub struct RemoteParticipant<T> {
    pub id: String,
    pub audio_track: Option<T>,
}

/// Connection lifecycle and media primitives of an RTC SDK.
pub trait RtcProvider: Send + Sync + 'static {
    type Capture: MicrophoneCapture;
    type RemoteTrack: RemoteAudioTrack;

    fn join(&self, request: JoinRequest) -> impl Future<Output = Result<(), CallError>> + Send;

    fn leave(&self) -> impl Future<Output = ()> + Send;

    fn is_connected(&self) -> bool;

    fn publish(
        &self,
        capture: &Self::Capture,
    ) -> impl Future<Output = Result<(), CallError>> + Send;

    fn unpublish(
        &self,
        capture: &Self::Capture,
    ) -> impl Future<Output = Result<(), CallError>> + Send;

    /// Snapshot of the live remote participant collection.
    fn remote_participants(&self) -> Vec<RemoteParticipant<Self::RemoteTrack>>;

    fn create_microphone_capture(
        &self,
        options: CaptureOptions,
    ) -> impl Future<Output = Result<Self::Capture, CallError>> + Send;
}
