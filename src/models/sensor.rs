use std::{fmt, str::FromStr};

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Log type tags carried by [`DataLogEntry::log_type`](super::DataLogEntry).
pub mod log_types {
    pub const ACTIVITY: &str = "activity";
    pub const SLEEP: &str = "sleep";
    pub const HEART: &str = "heart";
    pub const EXERCISE: &str = "exercise";
    pub const DEVICE: &str = "device";
}

/// Logical data category. The unit of mutex granularity and checkpoint
/// tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Sleep,
    Steps,
    HeartRate,
    Exercise,
    Device,
}

impl SensorType {
    pub const ALL: [SensorType; 5] = [
        SensorType::Sleep,
        SensorType::Steps,
        SensorType::HeartRate,
        SensorType::Exercise,
        SensorType::Device,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Sleep => "sleep",
            SensorType::Steps => "steps",
            SensorType::HeartRate => "heart_rate",
            SensorType::Exercise => "exercise",
            SensorType::Device => "device",
        }
    }

    pub fn log_type(&self) -> &'static str {
        match self {
            SensorType::Sleep => log_types::SLEEP,
            SensorType::Steps => log_types::ACTIVITY,
            SensorType::HeartRate => log_types::HEART,
            SensorType::Exercise => log_types::EXERCISE,
            SensorType::Device => log_types::DEVICE,
        }
    }

    /// Checkpoint key for this sensor.
    pub fn record_type(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sleep" => Ok(SensorType::Sleep),
            "steps" => Ok(SensorType::Steps),
            "heart_rate" => Ok(SensorType::HeartRate),
            "exercise" => Ok(SensorType::Exercise),
            "device" => Ok(SensorType::Device),
            other => Err(anyhow!("unknown sensor type '{other}'")),
        }
    }
}
