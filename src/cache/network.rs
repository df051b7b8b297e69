//! HTTP implementation of [`Network`].

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;

use super::request::{Method, Request, Response};
use super::traits::Network;

/// Network access through a shared reqwest client
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("qretro/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
    Method::Options => reqwest::Method::OPTIONS,
  }
}

impl Network for HttpNetwork {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let client = self.client.clone();
    let request = request.clone();

    async move {
      let mut builder = client.request(to_reqwest(request.method), request.url.clone());
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }

      let res = builder
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

      let status = res.status();
      let mut response = Response::new(
        status.as_u16(),
        status.canonical_reason().unwrap_or_default(),
      );
      for (name, value) in res.headers() {
        if let Ok(value) = value.to_str() {
          response = response.with_header(name.as_str(), value);
        }
      }

      let body = res
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

      Ok(response.with_body(body.to_vec()))
    }
  }
}
