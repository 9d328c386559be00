use std::collections::HashMap;

use crate::provider::{RemoteAudioTrack, RemoteParticipant};

/// A remote track that was just started by [`PlaybackTracker::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedTrack {
    pub participant_id: String,
    pub track_id: String,
}

/// Remembers which remote track is playing for each participant so a render
/// pass never calls `play()` twice on the same track.
#[derive(Debug, Default)]
pub struct PlaybackTracker {
    /// participant id -> id of the track last played
    playing: HashMap<String, String>,
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play tracks that are new or replaced, and forget participants that
    /// left or dropped their audio.
    pub fn refresh<T: RemoteAudioTrack>(
        &mut self,
        participants: &[RemoteParticipant<T>],
    ) -> Vec<StartedTrack> {
        let mut started = Vec::new();
        let mut seen = HashMap::with_capacity(participants.len());

        for participant in participants {
            let Some(track) = &participant.audio_track else {
                continue;
            };
            let track_id = track.id();
            if self.playing.get(&participant.id) != Some(&track_id) {
                track.play();
                tracing::debug!("playing remote audio {track_id} of {}", participant.id);
                started.push(StartedTrack {
                    participant_id: participant.id.clone(),
                    track_id: track_id.clone(),
                });
            }
            seen.insert(participant.id.clone(), track_id);
        }

        self.playing = seen;
        started
    }

    #[cfg(test)]
    pub fn is_playing(&self, participant_id: &str) -> bool {
        self.playing.contains_key(participant_id)
    }

    pub fn clear(&mut self) {
        self.playing.clear();
    }
}
