//! HTTP server for the dashboard UI

use anyhow::{Context, Result};
use chrono::NaiveDate;
use percent_encoding::percent_decode_str;
use sales_dashboard::ingestion::DatasetLoader;
use sales_dashboard::{DashboardConfig, DashboardEngine, FilterSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Upper bound on request size; the API is GET-only.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = DashboardConfig::resolve(config_path.as_deref())?;
    let data_path = config
        .data_path
        .clone()
        .context("DASHBOARD_DATA (or data_path in the config file) must point at the sales table")?;

    let dataset = DatasetLoader::from_config(&config)
        .load(&data_path)
        .with_context(|| format!("failed to load {}", data_path.display()))?;
    // read-only after load; shared by every connection without locking
    let engine = Arc::new(DashboardEngine::new(dataset, &config));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Dashboard server listening on http://{}", config.bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&engine)));
    }
}

async fn handle_connection(mut stream: TcpStream, engine: Arc<DashboardEngine>) {
    use tokio::time::{timeout, Duration};

    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() > MAX_REQUEST_BYTES {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }

    if buffer.is_empty() {
        return;
    }

    let request = String::from_utf8_lossy(&buffer);
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("request", id = %request_id);
    let response = span.in_scope(|| handle_request(&request, &engine));

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

fn handle_request(request: &str, engine: &DashboardEngine) -> String {
    let Some(request_line) = request.lines().next() else {
        return create_response(400, "Bad Request", r#"{"error":"empty request"}"#);
    };
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", r#"{"error":"malformed request line"}"#);
    }

    let method = parts[0];
    let (path, query) = match parts[1].split_once('?') {
        Some((p, q)) => (p, q),
        None => (parts[1], ""),
    };
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    info!("{} {}", method, path);

    match (method, path) {
        ("GET", "/health") => create_response(200, "OK", r#"{"status":"ok"}"#),
        ("GET", "/api/filters") => json_response(&engine.filter_options()),
        ("GET", "/api/divisions") => json_response(&engine.divisions()),
        ("GET", "/api/dashboard") => {
            let spec = match filter_from_query(query) {
                Ok(spec) => spec,
                Err(msg) => return error_response(400, "Bad Request", &msg),
            };
            match engine.snapshot(&spec) {
                Ok(snapshot) => json_response(&snapshot),
                Err(e) => error_response(400, "Bad Request", &e.to_string()),
            }
        }
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        _ => error_response(404, "Not Found", &format!("no route for {} {}", method, path)),
    }
}

/// Map query parameters onto a filter spec. `division` and `region` may be
/// repeated or comma-separated.
fn filter_from_query(query: &str) -> std::result::Result<FilterSpec, String> {
    let mut divisions = Vec::new();
    let mut regions = Vec::new();
    let mut spec = FilterSpec::new();
    let mut from: Option<NaiveDate> = None;
    let mut to: Option<NaiveDate> = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode(value);
        match key {
            "division" => divisions.extend(split_list(&value)),
            "region" => regions.extend(split_list(&value)),
            "product" => spec = spec.with_product_query(value),
            "min_margin" => {
                let m: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("min_margin must be a number, got '{}'", value))?;
                spec = spec.with_min_margin(m);
            }
            "from" => from = Some(parse_date_param("from", &value)?),
            "to" => to = Some(parse_date_param("to", &value)?),
            other => return Err(format!("unknown parameter '{}'", other)),
        }
    }

    spec = spec.with_divisions(divisions).with_regions(regions);
    match (from, to) {
        (Some(start), Some(end)) => Ok(spec.with_date_range(start, end)),
        (None, None) => Ok(spec),
        _ => Err("both 'from' and 'to' are required for a date range".to_string()),
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_date_param(name: &str, value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("'{}' must be YYYY-MM-DD, got '{}'", name, value))
}

fn json_response<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(body) => create_response(200, "OK", &body),
        Err(e) => error_response(500, "Internal Server Error", &e.to_string()),
    }
}

fn error_response(status: u16, status_text: &str, message: &str) -> String {
    let body = serde_json::json!({ "error": message }).to_string();
    create_response(status, status_text, &body)
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
