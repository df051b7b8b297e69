use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::history::DEFAULT_MAX_ITEMS;
use crate::qr::{ErrorCorrectionLevel, RenderOptions, Theme};

/// Quiet zone modules; larger values only shrink the code itself
const MAX_QR_MARGIN: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub app: AppConfig,
  pub cache: CacheConfig,
  pub history: HistoryConfig,
  pub qr: QrConfig,
  /// SQLite database path (defaults to $XDG_DATA_HOME/qretro/qretro.db)
  pub database: Option<PathBuf>,
  /// Also write logs to this file
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Prefix of every cache partition name
  pub name: String,
  /// Origin the application is served from
  pub origin: String,
  pub base_path: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      name: "qretro".to_string(),
      origin: "http://localhost:3000".to_string(),
      base_path: "/QRetro/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Fixed version token; generated per deployment when unset
  pub version: Option<String>,
  pub max_static_entries: usize,
  pub max_dynamic_entries: usize,
  /// Files pre-cached on install, relative to the base path unless absolute
  pub essential_files: Vec<String>,
  /// Scan the root document for stylesheet and script references on install
  pub discover_assets: bool,
  pub static_extensions: Vec<String>,
  pub static_directories: Vec<String>,
  pub network_timeout_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    Self {
      version: None,
      max_static_entries: 50,
      max_dynamic_entries: 100,
      essential_files: strings(&[
        "",
        "index.html",
        "fonts/PixelOperatorMonoHB.ttf",
        "fonts/TT2020Base-Regular.woff2",
        "fonts/TT2020Base-Regular.ttf",
        "icon-192.png",
        "icon-512.png",
        "icon-180.png",
        "icon-167.png",
        "icon-152.png",
        "favicon.ico",
        "manifest.json",
        "share",
        "share/index.html",
      ]),
      discover_assets: true,
      static_extensions: strings(&[
        ".css", ".js", ".png", ".jpg", ".jpeg", ".svg", ".woff2", ".woff", ".ttf", ".ico",
      ]),
      static_directories: strings(&["/_next/static/", "/fonts/"]),
      network_timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
  pub max_items: usize,
  pub storage_key: String,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self {
      max_items: DEFAULT_MAX_ITEMS,
      storage_key: "qretro-history".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QrConfig {
  pub error_correction: ErrorCorrectionLevel,
  pub margin: u32,
  pub width: u32,
  pub theme: Theme,
  /// External encoder program
  pub encoder: PathBuf,
}

impl Default for QrConfig {
  fn default() -> Self {
    Self {
      error_correction: ErrorCorrectionLevel::M,
      margin: 2,
      width: 400,
      theme: Theme::Dark,
      encoder: PathBuf::from("qrencode"),
    }
  }
}

impl QrConfig {
  pub fn render_options(&self) -> RenderOptions {
    RenderOptions {
      error_correction_level: self.error_correction,
      margin: self.margin,
      width: self.width,
      ..RenderOptions::default()
    }
    .with_theme(self.theme)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./qretro.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/qretro/config.yaml
  ///
  /// Built-in defaults are used when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("qretro.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("qretro").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.history.max_items == 0 {
      return Err(eyre!("history.max_items must be at least 1"));
    }
    if config.qr.margin > MAX_QR_MARGIN {
      return Err(eyre!(
        "qr.margin must be at most {}, got {}",
        MAX_QR_MARGIN,
        config.qr.margin
      ));
    }

    Ok(config)
  }
}
