// =============================================================================
// Shared small types used across the kernel
// =============================================================================

use serde::{Deserialize, Serialize};

/// User-declared trading intent. `Flat` means "do not trade" and is
/// orthogonal to `arm` — both must be satisfied for the Hard Gates panel to
/// allow trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    Long,
    Short,
    Both,
    Flat,
}

impl Default for Intent {
    fn default() -> Self {
        Self::Flat
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Both => write!(f, "BOTH"),
            Self::Flat => write!(f, "FLAT"),
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            "BOTH" => Ok(Self::Both),
            "FLAT" => Ok(Self::Flat),
            other => Err(format!("invalid intent: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intent_is_flat() {
        assert_eq!(Intent::default(), Intent::Flat);
    }

    #[test]
    fn intent_roundtrips_through_display_and_parse() {
        for intent in [Intent::Long, Intent::Short, Intent::Both, Intent::Flat] {
            let parsed: Intent = intent.to_string().parse().unwrap();
            assert_eq!(parsed, intent);
        }
    }

    #[test]
    fn intent_parse_is_case_insensitive() {
        assert_eq!("long".parse::<Intent>().unwrap(), Intent::Long);
        assert_eq!("Flat".parse::<Intent>().unwrap(), Intent::Flat);
    }

    #[test]
    fn intent_parse_rejects_unknown() {
        assert!("SIDEWAYS".parse::<Intent>().is_err());
    }

    #[test]
    fn intent_serializes_to_the_same_uppercase_string_as_display() {
        for intent in [Intent::Long, Intent::Short, Intent::Both, Intent::Flat] {
            let json = serde_json::to_value(intent).unwrap();
            assert_eq!(json, serde_json::Value::String(intent.to_string()));
        }
    }
}
