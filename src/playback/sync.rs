//! Audio-Video Synchronisation
//!
//! Hält eine separate Audiospur synchron zum Remote-Video:
//! Play/Pause und Seeks werden gespiegelt, Drift wird korrigiert.

use serde::{Deserialize, Serialize};

/// Maximal tolerierte Drift in Sekunden
pub const DRIFT_TOLERANCE_SECS: f64 = 0.3;

/// Ereignis des Video-Elements (Positionen in Sekunden)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VideoEvent {
    Play { position: f64 },
    Pause { position: f64 },
    Seeked { position: f64 },
    TimeUpdate { position: f64 },
}

/// Befehl an die Audiospur
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AudioCommand {
    Play { from: f64 },
    Pause,
    Seek { to: f64 },
}

#[derive(Debug, Clone)]
pub struct AudioSync {
    tolerance: f64,
    playing: bool,
}

impl Default for AudioSync {
    fn default() -> Self {
        Self::new(DRIFT_TOLERANCE_SECS)
    }
}

impl AudioSync {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.abs(),
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Übersetzt ein Video-Ereignis in einen Audio-Befehl.
    ///
    /// `audio_position` ist die aktuelle Position der Audiospur.
    pub fn on_video_event(&mut self, event: VideoEvent, audio_position: f64) -> Option<AudioCommand> {
        match event {
            VideoEvent::Play { position } => {
                self.playing = true;
                Some(AudioCommand::Play { from: position })
            }
            VideoEvent::Pause { .. } => {
                let was_playing = std::mem::replace(&mut self.playing, false);
                was_playing.then_some(AudioCommand::Pause)
            }
            VideoEvent::Seeked { position } => Some(AudioCommand::Seek { to: position }),
            VideoEvent::TimeUpdate { position } => {
                // Auch der Sprung beim Loop-Neustart landet hier
                let drift = (position - audio_position).abs();
                if self.playing && drift > self.tolerance {
                    tracing::debug!("Audio drift {:.2}s, resyncing to {:.2}", drift, position);
                    Some(AudioCommand::Seek { to: position })
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_pause_are_mirrored() {
        let mut sync = AudioSync::default();

        assert_eq!(
            sync.on_video_event(VideoEvent::Play { position: 1.5 }, 0.0),
            Some(AudioCommand::Play { from: 1.5 })
        );
        assert_eq!(
            sync.on_video_event(VideoEvent::Pause { position: 2.0 }, 2.0),
            Some(AudioCommand::Pause)
        );
        // Doppeltes Pause erzeugt keinen Befehl
        assert_eq!(sync.on_video_event(VideoEvent::Pause { position: 2.0 }, 2.0), None);
    }

    #[test]
    fn test_small_drift_is_tolerated() {
        let mut sync = AudioSync::default();
        sync.on_video_event(VideoEvent::Play { position: 0.0 }, 0.0);

        assert_eq!(
            sync.on_video_event(VideoEvent::TimeUpdate { position: 10.0 }, 9.8),
            None
        );
    }

    #[test]
    fn test_loop_restart_resyncs_audio() {
        let mut sync = AudioSync::default();
        sync.on_video_event(VideoEvent::Play { position: 0.0 }, 0.0);

        assert_eq!(
            sync.on_video_event(VideoEvent::TimeUpdate { position: 0.1 }, 29.9),
            Some(AudioCommand::Seek { to: 0.1 })
        );
    }

    #[test]
    fn test_no_resync_while_paused() {
        let mut sync = AudioSync::default();
        assert_eq!(
            sync.on_video_event(VideoEvent::TimeUpdate { position: 5.0 }, 0.0),
            None
        );
        assert_eq!(
            sync.on_video_event(VideoEvent::Seeked { position: 5.0 }, 0.0),
            Some(AudioCommand::Seek { to: 5.0 })
        );
    }
}
