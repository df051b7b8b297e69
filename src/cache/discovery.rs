//! Finds stylesheet and script references in the root document.

use color_eyre::{eyre::eyre, Result};
use regex::Regex;

/// Asset paths referenced by `html` that live under `base_path`, in
/// document order and without duplicates.
pub fn discover_assets(html: &str, base_path: &str) -> Result<Vec<String>> {
  let patterns = [
    Regex::new(r#"href=["']([^"']*\.css)["']"#)
      .map_err(|e| eyre!("Invalid stylesheet pattern: {}", e))?,
    Regex::new(r#"src=["']([^"']*\.js)["']"#)
      .map_err(|e| eyre!("Invalid script pattern: {}", e))?,
  ];

  let mut found: Vec<(usize, String)> = patterns
    .iter()
    .flat_map(|re| re.captures_iter(html))
    .filter_map(|caps| caps.get(1))
    .filter(|m| m.as_str().starts_with(base_path))
    .map(|m| (m.start(), m.as_str().to_string()))
    .collect();
  found.sort_by_key(|(pos, _)| *pos);

  let mut assets: Vec<String> = Vec::with_capacity(found.len());
  for (_, path) in found {
    if !assets.contains(&path) {
      assets.push(path);
    }
  }

  Ok(assets)
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <link rel="stylesheet" href="/QRetro/_next/static/css/app.css">
  <link rel="preload" href='/QRetro/_next/static/css/fonts.css' as="style">
  <link rel="stylesheet" href="https://cdn.example/reset.css">
  <script src="/QRetro/_next/static/chunks/main.js"></script>
</head>
<body>
  <script src="/QRetro/_next/static/chunks/main.js"></script>
  <script src="/other/tracker.js"></script>
  <img src="/QRetro/icon-192.png">
</body>
</html>"#;

  #[test]
  fn test_discovers_in_scope_assets_in_order() {
    let assets = discover_assets(PAGE, "/QRetro/").unwrap();
    assert_eq!(
      assets,
      vec![
        "/QRetro/_next/static/css/app.css",
        "/QRetro/_next/static/css/fonts.css",
        "/QRetro/_next/static/chunks/main.js",
      ]
    );
  }

  #[test]
  fn test_no_matches() {
    assert!(discover_assets("<html></html>", "/QRetro/").unwrap().is_empty());
  }
}
