//! Duration Resolver
//!
//! Führt drei Quellen zu einer effektiven Gesprächsdauer zusammen:
//! Query-Parameter `seconds` > Site-Konfiguration > fester Default.
//!
//! Das Ergebnis wird einmalig eingerastet (latch), sobald die Uhr es
//! braucht und die Quellen feststehen. Danach ist es unveränderlich.

use serde::{Deserialize, Serialize};
use url::Url;

/// Name des Query-Parameters
pub const SECONDS_PARAM: &str = "seconds";

// ============================================================================
// TYPES
// ============================================================================

/// Woher die effektive Dauer stammt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationSource {
    Query,
    Config,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDuration {
    pub seconds: u32,
    pub source: DurationSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigSlot {
    Pending,
    Settled(Option<u32>),
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Clone)]
pub struct DurationResolver {
    fallback: u32,
    query: Option<u32>,
    config: ConfigSlot,
    latched: Option<ResolvedDuration>,
}

impl DurationResolver {
    pub fn new(fallback_seconds: u32) -> Self {
        Self {
            fallback: fallback_seconds.max(1),
            query: None,
            config: ConfigSlot::Pending,
            latched: None,
        }
    }

    /// Liest `seconds` aus einer URL oder einem Query-String
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = parse_seconds_param(query);
        if let Some(seconds) = self.query {
            tracing::debug!("Duration override from query: {}s", seconds);
        }
        self
    }

    pub fn query_seconds(&self) -> Option<u32> {
        self.query
    }

    /// Übernimmt das Ergebnis der Konfigurations-Abfrage.
    ///
    /// Wird nur einmal akzeptiert; gibt `false` zurück, wenn bereits
    /// ein Ergebnis vorlag. Nicht-positive Werte zählen als "kein Wert".
    pub fn settle_config(&mut self, duration_seconds: Option<u32>) -> bool {
        if self.config != ConfigSlot::Pending {
            tracing::debug!("Ignoring late duration config {:?}", duration_seconds);
            return false;
        }
        self.config = ConfigSlot::Settled(duration_seconds.filter(|d| *d > 0));
        true
    }

    /// Alle Quellen stehen fest
    pub fn is_settled(&self) -> bool {
        self.query.is_some() || self.config != ConfigSlot::Pending
    }

    pub fn is_latched(&self) -> bool {
        self.latched.is_some()
    }

    /// Effektive Dauer; vor dem Latch vorläufig
    pub fn current(&self) -> ResolvedDuration {
        if let Some(latched) = self.latched {
            return latched;
        }

        if let Some(seconds) = self.query {
            return ResolvedDuration {
                seconds,
                source: DurationSource::Query,
            };
        }

        match self.config {
            ConfigSlot::Settled(Some(seconds)) => ResolvedDuration {
                seconds,
                source: DurationSource::Config,
            },
            _ => ResolvedDuration {
                seconds: self.fallback,
                source: DurationSource::Fallback,
            },
        }
    }

    /// Rastet die Dauer ein, falls die Quellen feststehen.
    ///
    /// Gibt nur beim ersten erfolgreichen Latch `Some` zurück.
    pub fn latch(&mut self) -> Option<ResolvedDuration> {
        if self.latched.is_some() || !self.is_settled() {
            return None;
        }
        let resolved = self.current();
        self.latched = Some(resolved);
        tracing::info!(
            "Call duration latched at {}s ({:?})",
            resolved.seconds,
            resolved.source
        );
        Some(resolved)
    }
}

/// Extrahiert einen positiven `seconds`-Wert.
///
/// Akzeptiert eine vollständige URL, `?seconds=10` oder `seconds=10`.
pub fn parse_seconds_param(input: &str) -> Option<u32> {
    let input = input.trim();

    let raw = match Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == SECONDS_PARAM)
            .map(|(_, value)| value.into_owned()),
        Err(_) => {
            let query = input.split_once('?').map_or(input, |(_, q)| q);
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == SECONDS_PARAM)
                .map(|(_, value)| value.into_owned())
        }
    }?;

    match raw.trim().parse::<u32>() {
        Ok(seconds) if seconds > 0 => Some(seconds),
        _ => {
            tracing::debug!("Discarding invalid {} value {:?}", SECONDS_PARAM, raw);
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
