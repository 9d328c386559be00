use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Per-source cap: 2 seconds of 48kHz mono.
const MAX_SAMPLES_PER_SOURCE: usize = 48_000 * 2;

/// Mixes decoded remote audio from several participants into one stream.
///
/// Each remote track pushes i16 PCM under its own key. The host's audio
/// output pulls mixed samples; concurrent speakers are summed with
/// saturation instead of being interleaved.
pub struct PlayoutMixer {
    sources: Mutex<HashMap<String, VecDeque<i16>>>,
    max_samples: usize,
}

impl Default for PlayoutMixer {
    fn default() -> Self {
        Self::with_capacity(MAX_SAMPLES_PER_SOURCE)
    }
}

impl PlayoutMixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(max_samples: usize) -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            max_samples,
        }
    }

    /// Queue samples for `source`. Oldest samples are dropped past the cap.
    pub fn push(&self, source: &str, samples: &[i16]) {
        let mut sources = self.sources.lock().unwrap_or_else(|p| p.into_inner());
        let queue = sources.entry(source.to_string()).or_default();
        queue.extend(samples.iter().copied());

        let overflow = queue.len().saturating_sub(self.max_samples);
        if overflow > 0 {
            queue.drain(..overflow);
        }
    }

    /// Fill `out` with the mix of all sources.
    ///
    /// Returns how many leading samples carried audio; the rest is silence.
    pub fn pull(&self, out: &mut [i16]) -> usize {
        let mut sources = self.sources.lock().unwrap_or_else(|p| p.into_inner());
        let mut filled = 0;

        for (i, slot) in out.iter_mut().enumerate() {
            let mut acc: i32 = 0;
            let mut any = false;
            for queue in sources.values_mut() {
                if let Some(sample) = queue.pop_front() {
                    acc += i32::from(sample);
                    any = true;
                }
            }
            *slot = acc.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            if any {
                filled = i + 1;
            }
        }

        filled
    }

    /// Drop a source once its track stops.
    pub fn remove(&self, source: &str) {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(source);
    }

    pub fn clear(&self) {
        self.sources.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
