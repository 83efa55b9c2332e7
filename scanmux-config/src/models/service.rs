use anyhow::{Context, anyhow};
use scanmux_core::scan::ScanCoreConfig;
use scanmux_core::scan::runtime::ServiceOptions;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::validation;

/// Source that produced the service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanServiceConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Top-level service settings. `core` tunes scheduling policy; `service`
/// holds runtime knobs that do not change scheduling behaviour.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanServiceConfig {
    /// Result cache age, emergency grace period, vendor IE budget,
    /// background period bounds, software PNO timers and the channel plan.
    pub core: ScanCoreConfig,
    /// Event bus capacity and whether scanning starts enabled.
    pub service: ServiceOptions,
}

impl ScanServiceConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$SCANMUX_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$SCANMUX_CONFIG_JSON` (inline JSON),
    /// 3) the first default file that exists,
    /// 4) defaults.
    ///
    /// Whatever is loaded must pass [`validation::validate`].
    pub fn load_from_env() -> anyhow::Result<(Self, ScanServiceConfigSource)> {
        let (config, source) = Self::load_unvalidated()?;
        validation::validate(&config).with_context(|| {
            format!("scan service config from {source:?} failed validation")
        })?;
        Ok((config, source))
    }

    fn load_unvalidated() -> anyhow::Result<(Self, ScanServiceConfigSource)> {
        if let Ok(path_str) = env::var("SCANMUX_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScanServiceConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("SCANMUX_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse SCANMUX_CONFIG_JSON")?;
            return Ok((parsed, ScanServiceConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScanServiceConfigSource::File(path)));
        }

        Ok((Self::default(), ScanServiceConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read scan service config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid scan service config {}", path.display())
            }),
            Some("toml") | Some("tml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid scan service config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse scan service config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid scan service config json: {err}"))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "scanmux.toml",
            "scanmux.json",
            "config/scanmux.toml",
            "config/scanmux.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ScanServiceConfig::parse_from_str(
            r#"
            [core.pno]
            software_pno_enabled = true
            slow_iterations = 3

            [service]
            scanning_enabled_on_start = true
            "#,
            "inline",
        )
        .unwrap();

        assert!(config.core.pno.software_pno_enabled);
        assert_eq!(config.core.pno.slow_iterations, 3);
        assert_eq!(config.core.pno.fast_timer_ms, 120_000);
        assert_eq!(config.core.single.cached_results_max_age_ms, 180_000);
        assert!(config.service.scanning_enabled_on_start);
        assert_eq!(config.service.event_bus_capacity, 64);
    }

    #[test]
    fn json_is_accepted_without_extension() {
        let config = ScanServiceConfig::parse_from_str(
            r#"{"core": {"single": {"max_vendor_ie_bytes": 256}}}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.core.single.max_vendor_ie_bytes, 256);
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = ScanServiceConfig::parse_from_str("not = [valid", "inline")
            .unwrap_err()
            .to_string();
        assert!(err.contains("toml error"));
        assert!(err.contains("json error"));
    }
}
