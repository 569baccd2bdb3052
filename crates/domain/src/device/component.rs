use serde::{Deserialize, Serialize};

/// Home Assistant component a device is discovered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Switch,
    Sensor,
    BinarySensor,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_kind_as_str() {
        assert_eq!(ComponentKind::Switch.as_str(), "switch");
        assert_eq!(ComponentKind::Sensor.as_str(), "sensor");
        assert_eq!(ComponentKind::BinarySensor.as_str(), "binary_sensor");
    }

    #[test]
    fn test_component_kind_serializes_like_topic_segment() {
        let json = serde_json::to_string(&ComponentKind::BinarySensor).unwrap();
        assert_eq!(json, "\"binary_sensor\"");
    }
}
