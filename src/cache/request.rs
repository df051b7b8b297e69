//! Request and response values flowing through the fetch handler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
  #[default]
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Some(Method::Get),
      "HEAD" => Some(Method::Head),
      "POST" => Some(Method::Post),
      "PUT" => Some(Method::Put),
      "PATCH" => Some(Method::Patch),
      "DELETE" => Some(Method::Delete),
      "OPTIONS" => Some(Method::Options),
      _ => None,
    }
  }
}

/// How the request was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Browser page load
  Navigate,
  Cors,
}

#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Header names are stored lowercase
  pub headers: BTreeMap<String, String>,
  pub mode: RequestMode,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      headers: BTreeMap::new(),
      mode: RequestMode::Cors,
    }
  }

  /// A page load initiated by the browser
  pub fn navigate(url: Url) -> Self {
    Self::get(url)
      .with_mode(RequestMode::Navigate)
      .with_header("accept", "text/html,application/xhtml+xml")
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map_or(false, |accept| accept.contains("text/html"))
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate || (self.method == Method::Get && self.accepts_html())
  }

  /// Identity of the request inside a cache partition
  pub fn cache_key(&self) -> String {
    self.url.as_str().to_string()
  }
}

/// A response payload, either from the network or from a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, status_text: impl Into<String>) -> Self {
    Self {
      status,
      status_text: status_text.into(),
      headers: BTreeMap::new(),
      body: Vec::new(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  /// 2xx status
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Plain-text 503 returned when nothing better is available
  pub fn offline_text() -> Self {
    Self::new(503, "Service Unavailable")
      .with_header("content-type", "text/plain")
      .with_body("Offline - Resource not available")
  }

  /// JSON 503 returned for failed external requests
  pub fn offline_json() -> Self {
    let body = serde_json::json!({ "error": "Network unavailable", "offline": true });
    Self::new(503, "Service Unavailable")
      .with_header("content-type", "application/json")
      .with_body(body.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_navigation_detection() {
    let nav = Request::navigate(url("https://x.y/QRetro/"));
    assert!(nav.is_navigation());

    let html = Request::get(url("https://x.y/QRetro/share")).with_header("Accept", "text/html");
    assert!(html.is_navigation());

    let json = Request::get(url("https://x.y/api")).with_header("accept", "application/json");
    assert!(!json.is_navigation());
  }

  #[test]
  fn test_offline_json_body() {
    let res = Response::offline_json();
    assert_eq!(res.status, 503);
    assert!(!res.ok());
    let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(body["offline"], true);
    assert_eq!(res.header("Content-Type"), Some("application/json"));
  }

  #[test]
  fn test_method_parse() {
    assert_eq!(Method::parse("post"), Some(Method::Post));
    assert_eq!(Method::parse("BREW"), None);
  }
}
