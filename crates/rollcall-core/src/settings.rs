use crate::frame_recognizer::DEFAULT_DOWNSCALE;
use crate::matcher::DEFAULT_TOLERANCE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration shared by the daemon and the CLI.
///
/// Defaults, then an optional TOML file, then `ROLLCALL_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// SQLite database holding students and attendance.
    pub db_path: PathBuf,
    /// Encoding blob written by `rollcall encode`.
    pub encodings_path: PathBuf,
    /// Recognition tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Scale applied to frames before detection, in (0, 1].
    pub downscale: f32,
    /// Maximum Euclidean distance for a face to count as a match.
    pub match_tolerance: f32,
    /// Minimum seconds between two recorded attendances of one student.
    pub cooldown_secs: u64,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Consecutive failed frame reads before a warning is logged.
    pub frame_failure_warn_after: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = crate::data_dir();
        Self {
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            model_dir: crate::default_model_dir(),
            db_path: data_dir.join("attendance.db"),
            encodings_path: data_dir.join("encodings.json"),
            tick_interval_ms: 30,
            downscale: DEFAULT_DOWNSCALE,
            match_tolerance: DEFAULT_TOLERANCE,
            cooldown_secs: 60,
            warmup_frames: 4,
            frame_failure_warn_after: 30,
        }
    }
}

impl Settings {
    /// Load from the config file (if any) and the process environment.
    ///
    /// `ROLLCALL_CONFIG` names the file explicitly and must exist; otherwise
    /// `$XDG_CONFIG_HOME/rollcall/config.toml` is read when present.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(settings)
    }

    /// Override fields from `ROLLCALL_*` variables looked up through `get`.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = get("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("ROLLCALL_ENCODINGS_PATH") {
            self.encodings_path = PathBuf::from(v);
        }
        env_parse(&get, "ROLLCALL_FRAME_WIDTH", &mut self.frame_width);
        env_parse(&get, "ROLLCALL_FRAME_HEIGHT", &mut self.frame_height);
        env_parse(&get, "ROLLCALL_TICK_INTERVAL_MS", &mut self.tick_interval_ms);
        env_parse(&get, "ROLLCALL_DOWNSCALE", &mut self.downscale);
        env_parse(&get, "ROLLCALL_MATCH_TOLERANCE", &mut self.match_tolerance);
        env_parse(&get, "ROLLCALL_COOLDOWN_SECS", &mut self.cooldown_secs);
        env_parse(&get, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        env_parse(&get, "ROLLCALL_FRAME_FAILURE_WARN_AFTER", &mut self.frame_failure_warn_after);
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |key, reason: &str| {
            Err(SettingsError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };

        if !(self.downscale > 0.0 && self.downscale <= 1.0) {
            return invalid("downscale", "must be in (0, 1]");
        }
        if !(self.match_tolerance > 0.0) {
            return invalid("match_tolerance", "must be positive");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms", "must be at least 1");
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return invalid("frame_width/frame_height", "must be non-zero");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("rollcall/config.toml")
}

fn env_parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = get(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "unparseable value, keeping current setting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.tick_interval(), Duration::from_millis(30));
        assert_eq!(s.cooldown(), Duration::from_secs(60));
        assert_eq!(s.downscale, 0.25);
        assert!(s.db_path.ends_with("rollcall/attendance.db"));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let s: Settings = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            cooldown_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(s.camera_device, "/dev/video4");
        assert_eq!(s.cooldown_secs, 120);
        assert_eq!(s.frame_width, 640);
    }

    #[test]
    fn test_toml_unknown_field_rejected() {
        assert!(toml::from_str::<Settings>("camera = \"/dev/video4\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut s = Settings::default();
        s.apply_env(env(&[
            ("ROLLCALL_DB_PATH", "/var/lib/rollcall/a.db"),
            ("ROLLCALL_MATCH_TOLERANCE", "0.9"),
            ("ROLLCALL_COOLDOWN_SECS", " 5 "),
        ]));
        assert_eq!(s.db_path, PathBuf::from("/var/lib/rollcall/a.db"));
        assert_eq!(s.match_tolerance, 0.9);
        assert_eq!(s.cooldown_secs, 5);
    }

    #[test]
    fn test_env_unparseable_keeps_value() {
        let mut s = Settings::default();
        s.apply_env(env(&[("ROLLCALL_TICK_INTERVAL_MS", "fast")]));
        assert_eq!(s.tick_interval_ms, 30);
    }

    #[test]
    fn test_validate_rejects_bad_downscale() {
        let s = Settings {
            downscale: 1.5,
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::Invalid { key: "downscale", .. })));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Settings::from_file(Path::new("/nonexistent/rollcall.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}
