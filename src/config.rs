//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::availability::{MAX_GENERATED_DAYS, MAX_SLOTS_PER_DAY, SlotSource};
use crate::error::ConfigError;

/// Default minimum length for insurance member IDs.
pub const DEFAULT_INSURANCE_ID_MIN_LENGTH: usize = 4;

/// Clinic catalog and intake policy consumed by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Known doctor names, in display spelling.
    pub doctors: Vec<String>,
    /// Known clinic locations, in display spelling.
    pub locations: Vec<String>,
    /// Where bookable slots come from.
    pub slots: SlotSource,
    pub insurance_id_min_length: usize,
    /// Accept any doctor/location text instead of matching the catalog.
    pub open_ended_doctor_location: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            doctors: vec![
                "Dr. Smith".to_string(),
                "Dr. Sharma".to_string(),
                "Dr. Iyer".to_string(),
            ],
            locations: vec![
                "Downtown Clinic".to_string(),
                "Indiranagar Clinic".to_string(),
            ],
            slots: SlotSource::default(),
            insurance_id_min_length: DEFAULT_INSURANCE_ID_MIN_LENGTH,
            open_ended_doctor_location: false,
        }
    }
}

impl IntakeConfig {
    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.insurance_id_min_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "insurance_id_min_length".into(),
                message: "must be at least 1".into(),
            });
        }
        if !self.open_ended_doctor_location {
            if self.doctors.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "doctors".into(),
                    message: "at least one doctor is required unless open_ended_doctor_location is set".into(),
                });
            }
            if self.locations.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "locations".into(),
                    message: "at least one location is required unless open_ended_doctor_location is set".into(),
                });
            }
        }
        if let SlotSource::Generated(generator) = &self.slots {
            if generator.duration_minutes == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "slots.duration_minutes".into(),
                    message: "must be greater than zero".into(),
                });
            }
            if generator.days > MAX_GENERATED_DAYS {
                return Err(ConfigError::InvalidValue {
                    key: "slots.days".into(),
                    message: format!("must be at most {MAX_GENERATED_DAYS}"),
                });
            }
            let too_many = std::iter::once(generator.slots_per_day)
                .chain(generator.capacity.iter().map(|c| c.slots_per_day))
                .any(|n| n > MAX_SLOTS_PER_DAY);
            if too_many {
                return Err(ConfigError::InvalidValue {
                    key: "slots.slots_per_day".into(),
                    message: format!("must be at most {MAX_SLOTS_PER_DAY}"),
                });
            }
        }
        Ok(())
    }
}

/// Process-level configuration for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub intake: IntakeConfig,
    /// Directory simulated email/SMS/form artifacts are written to.
    pub outbox_dir: PathBuf,
    /// Sessions idle longer than this are dropped by the controller.
    pub session_idle_timeout: Duration,
    /// How often idle sessions are pruned.
    pub prune_interval: Duration,
    /// Port for the status API. Disabled when `None`.
    pub http_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            intake: IntakeConfig::default(),
            outbox_dir: PathBuf::from("./data/outbox"),
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            prune_interval: Duration::from_secs(60),
            http_port: None,
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// - `INTAKE_CONFIG_PATH`: JSON file with the clinic catalog and slots
    /// - `INTAKE_OUTBOX_DIR`: artifact directory (default `./data/outbox`)
    /// - `INTAKE_SESSION_IDLE_SECS`: idle timeout (default 3600)
    /// - `INTAKE_HTTP_PORT`: enables the status API
    /// - `INTAKE_ID_MIN_LEN`: overrides `insurance_id_min_length`
    /// - `INTAKE_OPEN_ENDED`: overrides `open_ended_doctor_location`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut intake = match lookup("INTAKE_CONFIG_PATH") {
            Some(path) => IntakeConfig::load(Path::new(&path))?,
            None => IntakeConfig::default(),
        };
        if let Some(min_len) = parse_var::<usize>(&lookup, "INTAKE_ID_MIN_LEN")? {
            intake.insurance_id_min_length = min_len;
        }
        if let Some(raw) = lookup("INTAKE_OPEN_ENDED") {
            intake.open_ended_doctor_location = parse_bool("INTAKE_OPEN_ENDED", &raw)?;
        }
        intake.validate()?;

        let outbox_dir = lookup("INTAKE_OUTBOX_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.outbox_dir);

        let session_idle_timeout = parse_var::<u64>(&lookup, "INTAKE_SESSION_IDLE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_idle_timeout);

        let http_port = parse_var::<u16>(&lookup, "INTAKE_HTTP_PORT")?;

        Ok(Self {
            intake,
            outbox_dir,
            session_idle_timeout,
            prune_interval: defaults.prune_interval,
            http_port,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = IntakeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.insurance_id_min_length, 4);
        assert!(!config.open_ended_doctor_location);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = IntakeConfig::from_json_str(
            r#"{"doctors": ["Dr. House"], "insurance_id_min_length": 6}"#,
        )
        .unwrap();
        assert_eq!(config.doctors, vec!["Dr. House"]);
        assert_eq!(config.insurance_id_min_length, 6);
        assert_eq!(config.locations, IntakeConfig::default().locations);
    }

    #[test]
    fn rejects_zero_min_length() {
        let err = IntakeConfig::from_json_str(r#"{"insurance_id_min_length": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "insurance_id_min_length"));
    }

    #[test]
    fn empty_catalog_requires_open_ended() {
        assert!(IntakeConfig::from_json_str(r#"{"doctors": []}"#).is_err());
        assert!(
            IntakeConfig::from_json_str(r#"{"doctors": [], "open_ended_doctor_location": true}"#)
                .is_ok()
        );
    }

    #[test]
    fn oversized_generator_is_rejected() {
        let err = IntakeConfig::from_json_str(
            r#"{"slots": {"kind": "generated", "days": 100000, "slots_per_day": 100000}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "slots.days"));

        let err = IntakeConfig::from_json_str(
            r#"{"slots": {"kind": "generated", "capacity": [
                {"doctor": "Dr. Smith", "location": "Downtown Clinic", "slots_per_day": 4294967295}
            ]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "slots.slots_per_day"));

        assert!(
            IntakeConfig::from_json_str(
                r#"{"slots": {"kind": "generated", "days": 366, "slots_per_day": 1440}}"#
            )
            .is_ok()
        );
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = IntakeConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("INTAKE_OUTBOX_DIR", "/tmp/outbox"),
            ("INTAKE_SESSION_IDLE_SECS", "120"),
            ("INTAKE_HTTP_PORT", "8088"),
            ("INTAKE_ID_MIN_LEN", "6"),
            ("INTAKE_OPEN_ENDED", "yes"),
        ]))
        .unwrap();
        assert_eq!(config.outbox_dir, PathBuf::from("/tmp/outbox"));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(120));
        assert_eq!(config.http_port, Some(8088));
        assert_eq!(config.intake.insurance_id_min_length, 6);
        assert!(config.intake.open_ended_doctor_location);
    }

    #[test]
    fn env_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.outbox_dir, PathBuf::from("./data/outbox"));
        assert_eq!(config.http_port, None);
        assert_eq!(config.intake, IntakeConfig::default());
    }

    #[test]
    fn invalid_env_values() {
        let err = AppConfig::from_lookup(lookup(&[("INTAKE_HTTP_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "INTAKE_HTTP_PORT"));

        let err = AppConfig::from_lookup(lookup(&[("INTAKE_OPEN_ENDED", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.json");
        std::fs::write(&path, r#"{"locations": ["Harbor Clinic"]}"#).unwrap();

        let config = AppConfig::from_lookup(lookup(&[(
            "INTAKE_CONFIG_PATH",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(config.intake.locations, vec!["Harbor Clinic"]);
    }
}
