//! Receiver (front-end) description

use std::fmt;

/// Polarization basis of the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Basis {
    /// Linear dipoles (`LIN`)
    #[default]
    Linear,
    /// Circular (`CIRC`)
    Circular,
}

impl Basis {
    /// Container label
    pub fn label(self) -> &'static str {
        match self {
            Basis::Linear => "LIN",
            Basis::Circular => "CIRC",
        }
    }

    /// Parse a container label
    pub fn parse(label: &str) -> Option<Basis> {
        match label.trim() {
            "LIN" => Some(Basis::Linear),
            "CIRC" => Some(Basis::Circular),
            _ => None,
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the feed rotates during the observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedTracking {
    /// Fixed feed angle (`FA`)
    #[default]
    FixedAngle,
    /// Constant position angle (`CPA`)
    ConstantPosition,
    /// Constant galactic position angle (`GPA`)
    GalacticPosition,
}

impl FeedTracking {
    /// Container label
    pub fn label(self) -> &'static str {
        match self {
            FeedTracking::FixedAngle => "FA",
            FeedTracking::ConstantPosition => "CPA",
            FeedTracking::GalacticPosition => "GPA",
        }
    }

    /// Parse a container label
    pub fn parse(label: &str) -> Option<FeedTracking> {
        match label.trim() {
            "FA" => Some(FeedTracking::FixedAngle),
            "CPA" => Some(FeedTracking::ConstantPosition),
            "GPA" => Some(FeedTracking::GalacticPosition),
            _ => None,
        }
    }
}

/// Front-end receiver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Receiver {
    /// Receiver name (`FRONTEND`)
    pub name: String,
    /// Feed basis (`FD_POLN`)
    pub basis: Basis,
    /// Feed tracking mode (`FD_MODE`)
    pub tracking: FeedTracking,
    /// Angle of the X probe, degrees (`XPOL_ANG`)
    pub xpol_angle_deg: f64,
    /// Attenuation of probe A, dB
    pub atten_a: f64,
    /// Attenuation of probe B, dB
    pub atten_b: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        for basis in [Basis::Linear, Basis::Circular] {
            assert_eq!(Basis::parse(basis.label()), Some(basis));
        }
        assert_eq!(Basis::parse("ELLIPTIC"), None);
        assert_eq!(FeedTracking::parse(" CPA "), Some(FeedTracking::ConstantPosition));
        assert_eq!(FeedTracking::parse("XX"), None);
    }
}
