//! Remote-Wiedergabe
//!
//! Der "Gesprächspartner" ist ein vorab aufgenommenes Video in
//! Endlosschleife, optional mit separater Audiospur.

use crate::config::RemoteMediaConfig;
use serde::{Deserialize, Serialize};

/// Mitgeliefertes Standard-Video
pub const DEFAULT_REMOTE_VIDEO: &str = "assets/fake-call-remote.mp4";

/// Quellen und Flags der Remote-Wiedergabe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlayback {
    pub video_src: String,
    pub audio_src: Option<String>,
    pub looping: bool,
    pub video_muted: bool,
    /// Quellen stammen aus der Site-Konfiguration
    pub configured: bool,
}

impl Default for RemotePlayback {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RemotePlayback {
    /// Stummes Standard-Video
    pub fn builtin() -> Self {
        Self {
            video_src: DEFAULT_REMOTE_VIDEO.to_string(),
            audio_src: None,
            looping: true,
            video_muted: true,
            configured: false,
        }
    }

    pub fn from_config(config: Option<&RemoteMediaConfig>) -> Self {
        let Some(config) = config else {
            return Self::builtin();
        };

        let video = config.video_url.clone();
        let audio = config.audio_url.clone();
        if video.is_none() && audio.is_none() {
            return Self::builtin();
        }

        let video_muted = match (&video, &audio) {
            // Separate Audiospur: das Video bleibt stumm
            (_, Some(_)) => true,
            (Some(_), None) => false,
            (None, None) => true,
        };

        Self {
            video_src: video.unwrap_or_else(|| DEFAULT_REMOTE_VIDEO.to_string()),
            audio_src: audio,
            looping: true,
            video_muted,
            configured: true,
        }
    }

    pub fn has_separate_audio(&self) -> bool {
        self.audio_src.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_without_config() {
        assert_eq!(RemotePlayback::from_config(None), RemotePlayback::builtin());
        assert_eq!(
            RemotePlayback::from_config(Some(&RemoteMediaConfig::default())),
            RemotePlayback::builtin()
        );
    }

    #[test]
    fn test_configured_video_with_separate_audio() {
        let config = RemoteMediaConfig {
            video_url: Some("https://cdn.example/loop.mp4".into()),
            audio_url: Some("https://cdn.example/voice.mp3".into()),
            duration_seconds: None,
        };
        let playback = RemotePlayback::from_config(Some(&config));

        assert_eq!(playback.video_src, "https://cdn.example/loop.mp4");
        assert!(playback.has_separate_audio());
        assert!(playback.video_muted);
        assert!(playback.looping);
    }

    #[test]
    fn test_configured_video_keeps_own_sound() {
        let config = RemoteMediaConfig {
            video_url: Some("https://cdn.example/loop.mp4".into()),
            ..Default::default()
        };
        assert!(!RemotePlayback::from_config(Some(&config)).video_muted);
    }

    #[test]
    fn test_audio_only_uses_default_video() {
        let config = RemoteMediaConfig {
            audio_url: Some("https://cdn.example/voice.mp3".into()),
            ..Default::default()
        };
        let playback = RemotePlayback::from_config(Some(&config));
        assert_eq!(playback.video_src, DEFAULT_REMOTE_VIDEO);
        assert!(playback.configured);
    }
}
