//! Playback Module - Remote-Video des Gesprächspartners
//!
//! Dieses Modul verwaltet:
//! - Die Quellen der Remote-Wiedergabe (Standard oder konfiguriert)
//! - Die Synchronisation einer separaten Audiospur

mod remote;
mod sync;

pub use remote::{RemotePlayback, DEFAULT_REMOTE_VIDEO};
pub use sync::{AudioCommand, AudioSync, VideoEvent, DRIFT_TOLERANCE_SECS};
