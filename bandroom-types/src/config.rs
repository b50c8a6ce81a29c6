//! Process-wide configuration for the room core.
//!
//! Grace period and BPM bounds are process-wide constants, not per-room
//! settings — they come from a single embedded `config.toml`, optionally
//! overridden by a user config file, layered the same way as the original
//! session defaults this crate's config module is descended from.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    metronome: MetronomeConfigFile,
    #[serde(default)]
    session: SessionConfigFile,
}

#[derive(Deserialize, Default)]
struct MetronomeConfigFile {
    bpm_min: Option<u32>,
    bpm_max: Option<u32>,
    bpm_default: Option<u32>,
}

#[derive(Deserialize, Default)]
struct SessionConfigFile {
    grace_period_ms: Option<u64>,
    intentionally_left_ttl_ms: Option<u64>,
    max_participants: Option<usize>,
}

/// Resolved configuration used by the room store, session registry, and
/// metronome engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub grace_period_ms: u64,
    pub bpm_min: u32,
    pub bpm_max: u32,
    pub bpm_default: u32,
    pub max_participants: usize,
    pub intentionally_left_ttl_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grace_period_ms: 30_000,
            bpm_min: 1,
            bpm_max: 1000,
            bpm_default: 90,
            max_participants: 10,
            intentionally_left_ttl_ms: 60_000,
        }
    }
}

impl Config {
    /// Load the embedded defaults, merged with an optional user config file.
    /// Malformed user config is logged and ignored rather than treated as
    /// fatal — a typo in a config file should never take the room service
    /// down.
    pub fn load() -> Self {
        let mut resolved = Config::default();

        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG)
            .expect("failed to parse embedded config.toml");
        resolved.apply(&base);

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => resolved.apply(&user),
                        Err(e) => log::warn!(
                            target: "config",
                            "ignoring malformed config {}: {}",
                            path.display(),
                            e
                        ),
                    },
                    Err(e) => log::warn!(
                        target: "config",
                        "could not read config {}: {}",
                        path.display(),
                        e
                    ),
                }
            }
        }

        resolved
    }

    fn apply(&mut self, file: &ConfigFile) {
        if let Some(v) = file.metronome.bpm_min {
            self.bpm_min = v;
        }
        if let Some(v) = file.metronome.bpm_max {
            self.bpm_max = v;
        }
        if let Some(v) = file.metronome.bpm_default {
            self.bpm_default = v;
        }
        if let Some(v) = file.session.grace_period_ms {
            self.grace_period_ms = v;
        }
        if let Some(v) = file.session.intentionally_left_ttl_ms {
            self.intentionally_left_ttl_ms = v;
        }
        if let Some(v) = file.session.max_participants {
            self.max_participants = v;
        }
    }

    /// Clamp a raw bpm value into `[bpm_min, bpm_max]`.
    pub fn clamp_bpm(&self, bpm: i64) -> u32 {
        bpm.clamp(self.bpm_min as i64, self.bpm_max as i64) as u32
    }
}

fn user_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config").join("bandroom").join("config.toml"))
}
