//! Call Session Module - Lebenszyklus eines Gesprächs
//!
//! Dieses Modul verwaltet:
//! - Geräte-Anforderung und Freigabe
//! - Die effektive Gesprächsdauer (Query > Konfiguration > Default)
//! - Die Session-Uhr mit automatischem Ende
//! - Mikrofon/Kamera an- und ausschalten

mod clock;
mod duration;
mod session;

pub use clock::{SessionClock, TICK_PERIOD};
pub use duration::{
    parse_seconds_param, DurationResolver, DurationSource, ResolvedDuration, SECONDS_PARAM,
};
pub use session::{
    format_duration, CallEvent, CallSession, CallSnapshot, CallStatus, EndReason, SessionOptions,
    StartOutcome,
};
