//! Command-line commands and their handlers.

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::{
  self, BuildVersion, ClientMessage, HttpNetwork, Method, Request, Scope, ServiceWorker,
  SqliteCacheStorage, WorkerMessage, WorkerSettings,
};
use crate::config::Config;
use crate::db::Database;
use crate::history::{export_file_name, HistoryItem, HistoryStore, QrOptions, SqliteLocalStorage};
use crate::qr::{
  generate_qr_data, missing_required, parse_share_url, share_url, ErrorCorrectionLevel, FieldKind,
  FormData, ImageFormat, QrDataType, QrEncoder, QrencodeCli, Theme, QR_TYPES,
};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List the QR data types and their fields
  Types,
  /// Encode form fields into a QR payload
  Generate(GenerateArgs),
  /// Decode a share link back into its type and payload
  Open { link: String },
  /// Print a share link for a payload
  Share {
    kind: QrDataType,
    /// Form field as name=value (repeatable)
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,
  },
  /// Browse and manage the local history
  #[command(subcommand)]
  History(HistoryCommand),
  /// Drive the offline cache manager
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
  kind: QrDataType,
  /// Form field as name=value (repeatable)
  #[arg(short = 'f', long = "field", value_parser = parse_field)]
  fields: Vec<(String, String)>,
  #[arg(long)]
  title: Option<String>,
  /// Record the code in the history
  #[arg(long)]
  save: bool,
  /// Render the image to this path
  #[arg(short, long)]
  output: Option<PathBuf>,
  #[arg(long, value_enum, default_value_t = ImageFormat::Png)]
  format: ImageFormat,
  #[arg(long, value_enum)]
  error_correction: Option<ErrorCorrectionLevel>,
  #[arg(long, value_enum)]
  theme: Option<Theme>,
  /// Keep the rendered code available offline
  #[arg(long, requires = "save")]
  cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
  /// List entries, most recent first
  List,
  /// Print one entry as JSON
  Show { id: String },
  Remove { id: String },
  Clear,
  /// Write the history as a JSON document
  Export {
    /// Output path, `-` for stdout (default: qretro-history-<date>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Print the history whenever it changes
  Watch,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Install a version and activate it
  Update {
    #[arg(long)]
    version: Option<String>,
  },
  /// Send a request through the active worker
  Fetch {
    /// Absolute URL or path under the application origin
    url: String,
    /// Treat as a page navigation
    #[arg(long)]
    navigate: bool,
    #[arg(long)]
    accept: Option<String>,
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// Show partitions and their usage
  Status,
  /// Post a JSON message to the active worker
  Message { json: String },
}

fn parse_field(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("invalid field '{}', expected name=value", s))
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
  match command {
    Command::Types => {
      print_types();
      Ok(())
    }
    Command::Generate(args) => generate(args, config).await,
    Command::Open { link } => {
      let (kind, payload) =
        parse_share_url(&link).ok_or_else(|| eyre!("Not a share link: {}", link))?;
      println!("{}\t{}", kind, payload);
      Ok(())
    }
    Command::Share { kind, fields } => {
      let data: FormData = fields.into_iter().collect();
      let payload = build_payload(kind, &data)?;
      let scope = Scope::new(&config.app.origin, &config.app.base_path)?;
      println!("{}", share_url(scope.origin(), scope.base_path(), kind, &payload));
      Ok(())
    }
    Command::History(command) => history(command, config).await,
    Command::Cache(command) => cache_command(command, config).await,
  }
}

fn print_types() {
  for config in QR_TYPES {
    println!("{} {:<6} {} - {}", config.icon, config.kind, config.label, config.description);
    for field in config.fields {
      let marker = if field.required { "*" } else { " " };
      let hint = match field.kind {
        FieldKind::Select => field
          .options
          .iter()
          .map(|(value, _)| *value)
          .collect::<Vec<_>>()
          .join("|"),
        _ => field.placeholder.unwrap_or_default().to_string(),
      };
      println!("    {}{:<12} {:<22} {}", marker, field.name, field.label, hint);
    }
  }
}

fn build_payload(kind: QrDataType, data: &FormData) -> Result<String> {
  let missing = missing_required(kind, data);
  if !missing.is_empty() {
    return Err(eyre!("Required fields: {}", missing.join(", ")));
  }

  let payload = generate_qr_data(kind, data);
  if payload.is_empty() {
    return Err(eyre!("No data to generate QR code"));
  }
  Ok(payload)
}

async fn generate(args: GenerateArgs, config: &Config) -> Result<()> {
  let data: FormData = args.fields.into_iter().collect();
  let payload = build_payload(args.kind, &data)?;
  println!("{}", payload);

  let mut options = config.qr.render_options();
  if let Some(theme) = args.theme {
    options = options.with_theme(theme);
  }
  if let Some(level) = args.error_correction {
    options.error_correction_level = level;
  }

  let encoder = QrencodeCli::new(&config.qr.encoder);

  if let Some(path) = &args.output {
    let image = encoder.encode(&payload, &options, args.format).await?;
    std::fs::write(path, &image.bytes)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
    eprintln!("Wrote {}", path.display());
  }

  if !args.save {
    return Ok(());
  }

  let store = open_history(config)?;
  let id = store.add(
    args.kind,
    &data,
    &payload,
    Some(QrOptions::from(&options)),
    args.title.as_deref(),
  );
  eprintln!("Saved {}", id);

  if args.cache {
    let image = encoder.encode(&payload, &options, ImageFormat::Svg).await?;
    let data_url = image
      .data_url()
      .ok_or_else(|| eyre!("Encoder returned an SVG that is not valid UTF-8"))?;

    let mut worker = restore_worker(config)?;
    worker
      .handle_message(WorkerMessage::CacheQrCode {
        qr_data: cache::QrCacheEntry {
          id: id.clone(),
          data_url,
          kind: args.kind,
          data: payload,
        },
      })
      .await?;
    eprintln!("Cached at {}", worker.qr_cache_key(&id)?);
  }

  Ok(())
}

fn open_history(config: &Config) -> Result<HistoryStore<SqliteLocalStorage>> {
  let db = Database::open(config.database.as_deref())?;
  Ok(HistoryStore::new(
    Arc::new(SqliteLocalStorage::new(db)),
    config.history.storage_key.clone(),
    config.history.max_items,
  ))
}

fn format_timestamp(millis: i64) -> String {
  DateTime::<Utc>::from_timestamp_millis(millis)
    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|| "-".to_string())
}

fn print_items(items: &[HistoryItem]) {
  if items.is_empty() {
    println!("No history");
    return;
  }

  for item in items {
    let label = item.title.as_deref().unwrap_or(&item.preview);
    println!(
      "{}  {:<6}  {}  {}",
      item.id,
      item.kind,
      format_timestamp(item.timestamp),
      label
    );
  }
}

async fn history(command: HistoryCommand, config: &Config) -> Result<()> {
  let store = open_history(config)?;

  match command {
    HistoryCommand::List => print_items(&store.snapshot().items),
    HistoryCommand::Show { id } => {
      let item = store
        .get(&id)
        .ok_or_else(|| eyre!("No history entry with id {}", id))?;
      println!("{}", serde_json::to_string_pretty(&item)?);
    }
    HistoryCommand::Remove { id } => {
      if store.get(&id).is_none() {
        return Err(eyre!("No history entry with id {}", id));
      }
      store.remove(&id);
    }
    HistoryCommand::Clear => store.clear(),
    HistoryCommand::Export { output } => {
      let json = store.export().to_json_pretty()?;
      let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(Utc::now().date_naive())));

      if path.as_os_str() == "-" {
        std::io::stdout().write_all(json.as_bytes())?;
        println!();
      } else {
        std::fs::write(&path, json)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        eprintln!("Exported to {}", path.display());
      }
    }
    HistoryCommand::Watch => watch(&store).await,
  }

  Ok(())
}

async fn watch(store: &HistoryStore<SqliteLocalStorage>) {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let listener = store.subscribe(move || {
    let _ = tx.send(());
  });
  let sync = store.spawn_sync();
  let mut ticker = tokio::time::interval(Duration::from_millis(500));

  print_items(&store.snapshot().items);
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      _ = ticker.tick() => {
        store.poll_external();
      }
      Some(()) = rx.recv() => {
        println!();
        print_items(&store.snapshot().items);
      }
    }
  }

  sync.abort();
  store.unsubscribe(listener);
}

fn open_cache(config: &Config) -> Result<Arc<SqliteCacheStorage>> {
  let db = Database::open(config.database.as_deref())?;
  Ok(Arc::new(SqliteCacheStorage::new(db)))
}

fn open_network(config: &Config) -> Result<Arc<HttpNetwork>> {
  Ok(Arc::new(HttpNetwork::new(Duration::from_secs(
    config.cache.network_timeout_secs,
  ))?))
}

fn restore_worker(config: &Config) -> Result<ServiceWorker<SqliteCacheStorage, HttpNetwork>> {
  let settings = WorkerSettings::from_config(config, String::new())?;
  ServiceWorker::restore(open_cache(config)?, open_network(config)?, settings)?
    .ok_or_else(|| eyre!("No active cache version; run `qretro cache update` first"))
}

async fn cache_command(command: CacheCommand, config: &Config) -> Result<()> {
  match command {
    CacheCommand::Update { version } => {
      let version = BuildVersion::resolve(version.as_deref(), config.cache.version.as_deref());
      let settings = WorkerSettings::from_config(config, version)?;
      let storage = open_cache(config)?;
      let mut worker = ServiceWorker::new(Arc::clone(&storage), open_network(config)?, settings);
      let mut clients = worker.subscribe_clients();

      worker.update().await?;

      while let Ok(message) = clients.try_recv() {
        match message {
          ClientMessage::CacheUpdated => eprintln!("Cache updated"),
          ClientMessage::ControllerChanged => eprintln!("Controller changed, reload open pages"),
        }
      }
      println!("Active version {} ({})", worker.version(), worker.state());
    }
    CacheCommand::Fetch {
      url,
      navigate,
      accept,
      method,
    } => {
      let worker = restore_worker(config)?;
      let method = Method::parse(&method).ok_or_else(|| eyre!("Unknown method: {}", method))?;

      let target = worker.scope().resolve(&url)?;
      let mut request = if navigate {
        Request::navigate(target)
      } else {
        Request::get(target)
      };
      request = request.with_method(method);
      if let Some(accept) = accept {
        request = request.with_header("accept", &accept);
      }

      match worker.handle_fetch(&request).await {
        Some(response) => {
          println!("{} {}", response.status, response.status_text);
          for (name, value) in &response.headers {
            println!("{}: {}", name, value);
          }
          println!();
          std::io::stdout().write_all(&response.body)?;
          println!();
        }
        None => println!("Not handled; request goes straight to the network"),
      }
    }
    CacheCommand::Status => {
      let settings = WorkerSettings::from_config(config, String::new())?;
      let storage = open_cache(config)?;
      let status = cache::status(storage.as_ref(), &settings.app, settings.scope())?;

      println!(
        "Active version: {}",
        status.active_version.as_deref().unwrap_or("none")
      );
      for partition in &status.partitions {
        let marker = if partition.active { "*" } else { " " };
        println!(
          "{} {:<40} {:>5} entries  {:>10}",
          marker,
          partition.name,
          partition.usage.entries,
          cache::format_bytes(partition.usage.bytes)
        );
      }
      println!(
        "Total: {} entries, {}",
        status.total_entries(),
        cache::format_bytes(status.total_bytes())
      );
    }
    CacheCommand::Message { json } => {
      let message = WorkerMessage::parse(&json)?;
      let mut worker = restore_worker(config)?;
      worker.handle_message(message).await?;
      println!("Delivered to version {}", worker.version());
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  #[test]
  fn test_parse_field() {
    assert_eq!(
      parse_field("url=https://x.y/?a=b").unwrap(),
      ("url".to_string(), "https://x.y/?a=b".to_string())
    );
    assert!(parse_field("novalue").is_err());
    assert!(parse_field("=x").is_err());
  }

  #[test]
  fn test_generate_arguments() {
    let cli = Cli::try_parse_from([
      "qretro", "generate", "wifi", "-f", "ssid=Net", "-f", "password=pw", "--save",
    ])
    .unwrap();

    match cli.command {
      Command::Generate(args) => {
        assert_eq!(args.kind, QrDataType::Wifi);
        assert_eq!(args.fields.len(), 2);
        assert!(args.save);
        assert_eq!(args.format, ImageFormat::Png);
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_cache_flag_requires_save() {
    assert!(Cli::try_parse_from(["qretro", "generate", "text", "-f", "text=hi", "--cache"]).is_err());
  }

  #[test]
  fn test_build_payload_reports_missing_fields() {
    let err = build_payload(QrDataType::Wifi, &FormData::new()).unwrap_err();
    assert!(err.to_string().starts_with("Required fields:"));

    let payload = build_payload(
      QrDataType::Phone,
      &[("phone".to_string(), "+1234567890".to_string())].into_iter().collect(),
    )
    .unwrap();
    assert_eq!(payload, "tel:+1234567890");
  }

  #[test]
  fn test_format_timestamp() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00");
  }
}
