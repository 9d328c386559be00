//! Huddle core: the call-session lifecycle behind a one-page voice call.
//!
//! Pure Rust crate. The RTC SDK sits behind [`provider::RtcProvider`];
//! a LiveKit implementation is available with the `livekit` feature.

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod params;
pub mod playback;
#[cfg(feature = "livekit")]
pub mod playout;
pub mod provider;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{CallConfig, LiveKitConfig};
pub use errors::CallError;
pub use events::{CallEvent, CallEventListener, CallState, ConnectionStatus};
pub use params::{ConnectionParameters, JoinRequest, ParameterUpdate};
#[cfg(feature = "livekit")]
pub use playout::PlayoutMixer;
pub use provider::{CaptureOptions, MicrophoneCapture, RemoteAudioTrack, RemoteParticipant, RtcProvider};
pub use session::{CallSession, CallView, MicrophoneState};
