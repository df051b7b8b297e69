//! Seam to the external QR symbol encoder.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::payload::encode_component;

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ErrorCorrectionLevel {
  #[value(name = "L")]
  L,
  #[default]
  #[value(name = "M")]
  M,
  #[value(name = "Q")]
  Q,
  #[value(name = "H")]
  H,
}

impl ErrorCorrectionLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::L => "L",
      Self::M => "M",
      Self::Q => "Q",
      Self::H => "H",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Dark,
  Light,
}

impl Theme {
  /// (dark module, light module) colours for the theme
  pub fn colors(&self) -> (&'static str, &'static str) {
    match self {
      Theme::Dark => ("#00ff00", "#000000"),
      Theme::Light => ("#1a1a1a", "#f8f8f0"),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ImageFormat {
  #[default]
  Png,
  Svg,
}

impl ImageFormat {
  pub fn mime(&self) -> &'static str {
    match self {
      ImageFormat::Png => "image/png",
      ImageFormat::Svg => "image/svg+xml",
    }
  }
}

/// Options passed through to the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
  pub error_correction_level: ErrorCorrectionLevel,
  pub margin: u32,
  /// Target image width in pixels
  pub width: u32,
  pub dark: String,
  pub light: String,
}

impl Default for RenderOptions {
  fn default() -> Self {
    Self {
      error_correction_level: ErrorCorrectionLevel::M,
      margin: 2,
      width: 400,
      dark: "#000000".to_string(),
      light: "#FFFFFF".to_string(),
    }
  }
}

impl RenderOptions {
  pub fn with_theme(mut self, theme: Theme) -> Self {
    let (dark, light) = theme.colors();
    self.dark = dark.to_string();
    self.light = light.to_string();
    self
  }
}

/// Encoded image produced by a [`QrEncoder`]
#[derive(Debug, Clone)]
pub struct QrImage {
  pub format: ImageFormat,
  pub bytes: Vec<u8>,
}

impl QrImage {
  /// `data:` URL for the image. Only SVG output can be inlined as text.
  pub fn data_url(&self) -> Option<String> {
    match self.format {
      ImageFormat::Svg => {
        let svg = std::str::from_utf8(&self.bytes).ok()?;
        Some(format!(
          "data:{};charset=utf-8,{}",
          self.format.mime(),
          encode_component(svg)
        ))
      }
      ImageFormat::Png => None,
    }
  }
}

/// Asynchronous QR image encoder.
pub trait QrEncoder: Send + Sync {
  fn encode(
    &self,
    payload: &str,
    options: &RenderOptions,
    format: ImageFormat,
  ) -> impl Future<Output = Result<QrImage>> + Send;
}

/// Encoder backed by the `qrencode` command-line program.
#[derive(Debug, Clone)]
pub struct QrencodeCli {
  program: PathBuf,
}

impl QrencodeCli {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn args(options: &RenderOptions, format: ImageFormat) -> Result<Vec<String>> {
    // qrencode sizes by module, so approximate the requested width
    // against a version 3 symbol (29 modules) plus margins.
    let modules = options.margin.saturating_mul(2).saturating_add(29);
    let dot_size = (options.width / modules).max(1);

    Ok(vec![
      "-o".to_string(),
      "-".to_string(),
      "-t".to_string(),
      match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Svg => "SVG".to_string(),
      },
      "-l".to_string(),
      options.error_correction_level.as_str().to_string(),
      "-m".to_string(),
      options.margin.to_string(),
      "-s".to_string(),
      dot_size.to_string(),
      format!("--foreground={}", hex_color(&options.dark)?),
      format!("--background={}", hex_color(&options.light)?),
    ])
  }
}

impl Default for QrencodeCli {
  fn default() -> Self {
    Self::new("qrencode")
  }
}

fn hex_color(color: &str) -> Result<String> {
  let hex = color.trim_start_matches('#');
  if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
    Ok(hex.to_uppercase())
  } else {
    Err(eyre!("Invalid colour '{}', expected #RRGGBB", color))
  }
}

impl QrEncoder for QrencodeCli {
  fn encode(
    &self,
    payload: &str,
    options: &RenderOptions,
    format: ImageFormat,
  ) -> impl Future<Output = Result<QrImage>> + Send {
    let program = self.program.clone();
    let payload = payload.to_string();
    let args = Self::args(options, format);

    async move {
      if payload.is_empty() {
        return Err(eyre!("No data to generate QR code"));
      }
      let args = args?;

      let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
          eyre!(
            "Failed to generate QR code: could not run {}: {}",
            program.display(),
            e
          )
        })?;

      if let Some(mut stdin) = child.stdin.take() {
        stdin
          .write_all(payload.as_bytes())
          .await
          .map_err(|e| eyre!("Failed to generate QR code: {}", e))?;
      }

      let output = child
        .wait_with_output()
        .await
        .map_err(|e| eyre!("Failed to generate QR code: {}", e))?;

      if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(eyre!("Failed to generate QR code: {}", stderr.trim()));
      }

      Ok(QrImage {
        format,
        bytes: output.stdout,
      })
    }
  }
}
