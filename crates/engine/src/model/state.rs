//! Enumerated header values

use std::fmt;

/// What the polarization axis holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolnState {
    /// Total intensity only
    #[default]
    Intensity,
    /// Two orthogonal power products
    PPQQ,
    /// Full coherency products
    Coherence,
    /// Stokes parameters
    Stokes,
    /// Polarimetric invariant interval
    Invariant,
}

impl PolnState {
    /// Container label (`POL_TYPE`)
    pub fn label(self) -> &'static str {
        match self {
            PolnState::Intensity => "INTEN",
            PolnState::PPQQ => "AABB",
            PolnState::Coherence => "AABBCRCI",
            PolnState::Stokes => "IQUV",
            PolnState::Invariant => "INVAR",
        }
    }

    /// Parse a container label
    pub fn parse(label: &str) -> Option<PolnState> {
        match label.trim() {
            "INTEN" | "AA+BB" => Some(PolnState::Intensity),
            "AABB" => Some(PolnState::PPQQ),
            "AABBCRCI" => Some(PolnState::Coherence),
            "IQUV" => Some(PolnState::Stokes),
            "INVAR" => Some(PolnState::Invariant),
            _ => None,
        }
    }

    /// Number of polarizations this state implies
    pub fn npol(self) -> usize {
        match self {
            PolnState::Intensity | PolnState::Invariant => 1,
            PolnState::PPQQ => 2,
            PolnState::Coherence | PolnState::Stokes => 4,
        }
    }
}

impl fmt::Display for PolnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of observation (`OBS_MODE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationType {
    /// Folded pulsar observation
    #[default]
    Pulsar,
    /// Polarization calibrator
    PolnCal,
    /// Flux calibrator on source
    FluxCalOn,
    /// Flux calibrator off source
    FluxCalOff,
    /// Unfolded search-mode data
    Search,
    /// Unrecognised mode
    Unknown,
}

impl ObservationType {
    /// Container label
    pub fn label(self) -> &'static str {
        match self {
            ObservationType::Pulsar => "PSR",
            ObservationType::PolnCal => "CAL",
            ObservationType::FluxCalOn => "FON",
            ObservationType::FluxCalOff => "FOF",
            ObservationType::Search => "SEARCH",
            ObservationType::Unknown => "UNKNOWN",
        }
    }

    /// Parse a container label; unrecognised labels give `Unknown`
    pub fn parse(label: &str) -> ObservationType {
        match label.trim() {
            "PSR" => ObservationType::Pulsar,
            "CAL" | "PCM" => ObservationType::PolnCal,
            "FON" => ObservationType::FluxCalOn,
            "FOF" => ObservationType::FluxCalOff,
            "SEARCH" => ObservationType::Search,
            _ => ObservationType::Unknown,
        }
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
