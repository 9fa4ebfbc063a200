use anyhow::{Context, Result};
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::profile::{ProfileSpec, expand_home};

const CONFIG_ENV: &str = "DPM_CONFIG";
const CONFIG_FILE: &str = "debug-profiles.yaml";
const HOME_CONFIG_DIR: &str = ".kube-dpm";

/// Colors for the interactive profile picker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PickerStyle {
    pub header_fg: Color,
    pub header_bg: Color,
    pub selected_fg: Color,
    pub selected_bg: Color,
}

impl Default for PickerStyle {
    fn default() -> Self {
        Self {
            header_fg: Color::Indexed(252),
            header_bg: Color::Indexed(236),
            selected_fg: Color::Indexed(229),
            selected_bg: Color::Indexed(57),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub source: PathBuf,
    pub kubectl_path: Option<PathBuf>,
    pub profiles: Vec<ProfileSpec>,
    pub style: PickerStyle,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default)]
    kubectl_path: Option<String>,
    #[serde(default)]
    profiles: Vec<ProfileSpec>,
    #[serde(default)]
    style: StyleSpec,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StyleSpec {
    #[serde(default)]
    header_foreground_color: Option<String>,
    #[serde(default)]
    header_background_color: Option<String>,
    #[serde(default)]
    selected_foreground_color: Option<String>,
    #[serde(default)]
    selected_background_color: Option<String>,
}

impl StyleSpec {
    fn complete(&self) -> PickerStyle {
        let defaults = PickerStyle::default();
        PickerStyle {
            header_fg: color_or(self.header_foreground_color.as_deref(), defaults.header_fg),
            header_bg: color_or(self.header_background_color.as_deref(), defaults.header_bg),
            selected_fg: color_or(
                self.selected_foreground_color.as_deref(),
                defaults.selected_fg,
            ),
            selected_bg: color_or(
                self.selected_background_color.as_deref(),
                defaults.selected_bg,
            ),
        }
    }
}

/// Reads the profile file named on the command line or found by discovery.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => discover_config_path().with_context(|| {
            format!(
                "no profile configuration found; pass --config, set {CONFIG_ENV} or create {CONFIG_FILE}"
            )
        })?,
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read profile config {}", path.display()))?;
    parse(&raw, path)
}

pub fn parse(raw: &str, source: PathBuf) -> Result<LoadedConfig> {
    let parsed: ConfigFile = serde_yaml::from_str(raw)
        .with_context(|| format!("failed to parse profile config {}", source.display()))?;
    debug!(
        source = %source.display(),
        profiles = parsed.profiles.len(),
        "loaded profile config"
    );

    Ok(LoadedConfig {
        kubectl_path: parsed
            .kubectl_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(expand_home),
        profiles: parsed.profiles,
        style: parsed.style.complete(),
        source,
    })
}

fn color_or(raw: Option<&str>, fallback: Color) -> Color {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return fallback;
    };
    Color::from_str(raw).unwrap_or_else(|_| {
        warn!("ignoring invalid color {raw:?} in style config");
        fallback
    })
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV)
        && !path.trim().is_empty()
    {
        return Some(expand_home(path.trim()));
    }

    let candidate = PathBuf::from(CONFIG_FILE);
    if candidate.exists() {
        return Some(candidate);
    }

    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(home).join(HOME_CONFIG_DIR).join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}
