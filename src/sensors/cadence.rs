//! Cadence arbitration across services.
//!
//! Up to three services may report cadence on the same connection. Priority is
//! CSC > Cycling Power > FTMS. A higher-ranked source takes over the value and
//! the tag. Lower-ranked sources are ignored until disconnect.
//!
//! The source holding the tag keeps updating the value. This includes FTMS:
//! once it owns cadence, its later readings are still consumed, rather than
//! FTMS being read only while no source is established at all.

use serde::{Deserialize, Serialize};

/// Service currently owning the cadence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceSource {
    /// Cycling Speed and Cadence sensor
    Csc,
    /// Cycling Power crank data
    Power,
    /// FTMS Indoor Bike Data
    Ftm,
}

impl CadenceSource {
    fn rank(self) -> u8 {
        match self {
            CadenceSource::Csc => 3,
            CadenceSource::Power => 2,
            CadenceSource::Ftm => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CadenceSource::Csc => "csc",
            CadenceSource::Power => "power",
            CadenceSource::Ftm => "ftm",
        }
    }
}

impl std::fmt::Display for CadenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a cadence value from `candidate` may replace the current one.
pub fn should_accept(current: Option<CadenceSource>, candidate: CadenceSource) -> bool {
    match current {
        None => true,
        Some(current) => candidate == current || candidate.rank() > current.rank(),
    }
}

/// Connection-scoped arbitration state.
#[derive(Debug, Clone, Default)]
pub struct CadenceArbiter {
    source: Option<CadenceSource>,
}

impl CadenceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current winning source.
    pub fn source(&self) -> Option<CadenceSource> {
        self.source
    }

    /// Offer a value; returns true and records the source if accepted.
    pub fn offer(&mut self, candidate: CadenceSource) -> bool {
        if !should_accept(self.source, candidate) {
            tracing::trace!(
                "Dropping {} cadence, source is {:?}",
                candidate,
                self.source
            );
            return false;
        }
        if self.source != Some(candidate) {
            tracing::debug!("Cadence source now {}", candidate);
        }
        self.source = Some(candidate);
        true
    }

    pub fn reset(&mut self) {
        self.source = None;
    }
}
