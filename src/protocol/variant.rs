use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, MAX_TEMP, MIN_TEMP};

/// Family of kettle firmware sharing one wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// Oldest generation, temperature encoded as a 1..5 level
    Variant1,
    /// RK-M171S family
    Variant2,
    /// RK-G200
    Variant3,
    /// RK-G2xxS, RK-M13xS, RK-M21xS, RK-M223S and RFS-KKL
    Variant4,
}

/// Optional device capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TurnOn,
    Sound,
    BoilTime,
    Clock,
    LampAutoOff,
    Colors,
    ColorInterval,
    ImpulseColor,
    LightSwitch,
    FreshWater,
    Stats,
    CommitSettings,
}

/// Response payloads whose layout may be unconfirmed for a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Status,
    Stats,
    Colors,
    FreshWater,
}

/// Advertised model name to protocol variant
static MODEL_TABLE: &[(&str, ProtocolVariant)] = &[
    ("RK-M171S", ProtocolVariant::Variant2),
    ("RK-G200", ProtocolVariant::Variant3),
    ("RK-G200S", ProtocolVariant::Variant4),
    ("RK-G201S", ProtocolVariant::Variant4),
    ("RK-G202S", ProtocolVariant::Variant4),
    ("RK-G203S", ProtocolVariant::Variant4),
    ("RK-G204S", ProtocolVariant::Variant4),
    ("RK-G210S", ProtocolVariant::Variant4),
    ("RK-G211S", ProtocolVariant::Variant4),
    ("RK-G212S", ProtocolVariant::Variant4),
    ("RK-G213S", ProtocolVariant::Variant4),
    ("RK-G214S", ProtocolVariant::Variant4),
    ("RK-G215S", ProtocolVariant::Variant4),
    ("RFS-KKL002", ProtocolVariant::Variant4),
    ("RFS-KKL003", ProtocolVariant::Variant4),
    ("RFS-KKL004", ProtocolVariant::Variant4),
    ("RK-G233S", ProtocolVariant::Variant4),
    ("RK-G240S", ProtocolVariant::Variant4),
    ("RK-M215S", ProtocolVariant::Variant4),
    ("RK-M216S", ProtocolVariant::Variant4),
    ("RK-M223S", ProtocolVariant::Variant4),
    ("RK-M136S", ProtocolVariant::Variant4),
    ("RK-M139S", ProtocolVariant::Variant4),
];

/// Regional suffix some kettles append to the advertised name
const REGION_SUFFIX: &str = "-E";

fn lookup(model: &str) -> Option<ProtocolVariant> {
    MODEL_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, variant)| *variant)
}

/// Resolves the protocol variant of an advertised model name.
///
/// Exact names win; otherwise a trailing `-E` is stripped and the lookup is
/// retried. There is no fallback variant.
pub fn variant_for(model: &str) -> Result<ProtocolVariant> {
    lookup(model)
        .or_else(|| model.strip_suffix(REGION_SUFFIX).and_then(lookup))
        .ok_or_else(|| Error::UnknownModel(model.to_string()))
}

/// Whether a model name belongs to a supported kettle
pub fn is_known_model(model: &str) -> bool {
    variant_for(model).is_ok()
}

impl ProtocolVariant {
    pub fn supports(&self, capability: Capability) -> bool {
        use Capability::TurnOn;
        match self {
            ProtocolVariant::Variant1 | ProtocolVariant::Variant2 => false,
            ProtocolVariant::Variant3 => matches!(capability, TurnOn),
            ProtocolVariant::Variant4 => true,
        }
    }

    /// Settable heating temperature range in °C
    pub fn temp_range(&self) -> (u8, u8) {
        match self {
            ProtocolVariant::Variant1
            | ProtocolVariant::Variant2
            | ProtocolVariant::Variant3
            | ProtocolVariant::Variant4 => (MIN_TEMP, MAX_TEMP),
        }
    }

    /// Whether the first byte of an auth response means success
    pub fn auth_accepted(&self, status: u8) -> bool {
        match self {
            ProtocolVariant::Variant1 | ProtocolVariant::Variant2 => status == 1,
            ProtocolVariant::Variant3 | ProtocolVariant::Variant4 => status != 0,
        }
    }

    /// Whether the response layout is confirmed on real hardware
    pub fn layout_verified(&self, layout: Layout) -> bool {
        match (self, layout) {
            (ProtocolVariant::Variant1, _) => false,
            (ProtocolVariant::Variant2 | ProtocolVariant::Variant3, Layout::Status) => true,
            (ProtocolVariant::Variant2 | ProtocolVariant::Variant3, _) => false,
            (ProtocolVariant::Variant4, Layout::Status) => true,
            (ProtocolVariant::Variant4, Layout::Stats | Layout::Colors | Layout::FreshWater) => false,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            ProtocolVariant::Variant1 => 1,
            ProtocolVariant::Variant2 => 2,
            ProtocolVariant::Variant3 => 3,
            ProtocolVariant::Variant4 => 4,
        };
        write!(f, "protocol variant {n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup() {
        assert_eq!(variant_for("RK-M171S").unwrap(), ProtocolVariant::Variant2);
        assert_eq!(variant_for("RK-G200").unwrap(), ProtocolVariant::Variant3);
        assert_eq!(variant_for("RK-G200S").unwrap(), ProtocolVariant::Variant4);
    }

    #[test]
    fn test_region_suffix_fallback() {
        assert_eq!(variant_for("RK-G200S-E").unwrap(), variant_for("RK-G200S").unwrap());
        assert_eq!(variant_for("RK-G200-E").unwrap(), ProtocolVariant::Variant3);
    }

    #[test]
    fn test_unknown_model() {
        assert!(matches!(variant_for("RK-M170S"), Err(Error::UnknownModel(m)) if m == "RK-M170S"));
        assert!(variant_for("RK-G200S-X").is_err());
        assert!(variant_for("").is_err());
        assert!(!is_known_model("Mi Band"));
    }

    #[test]
    fn test_capabilities() {
        assert!(ProtocolVariant::Variant4.supports(Capability::Colors));
        assert!(ProtocolVariant::Variant3.supports(Capability::TurnOn));
        assert!(!ProtocolVariant::Variant2.supports(Capability::TurnOn));
        assert!(!ProtocolVariant::Variant1.supports(Capability::BoilTime));
        assert!(!ProtocolVariant::Variant3.supports(Capability::Sound));
    }

    #[test]
    fn test_auth_acceptance() {
        assert!(ProtocolVariant::Variant4.auth_accepted(2));
        assert!(!ProtocolVariant::Variant4.auth_accepted(0));
        assert!(ProtocolVariant::Variant2.auth_accepted(1));
        assert!(!ProtocolVariant::Variant2.auth_accepted(2));
    }
}
