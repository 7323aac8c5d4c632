use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hookscope_types::StreamIdentity;

use crate::connection::ConnId;
use crate::error::StreamError;

/// Work order for a one-shot history fetch, created when a restored
/// identity's connection opens.
///
/// The connection generation and identity are captured here and compared
/// again when the result arrives, so a fetch that outlives its connection
/// is discarded instead of applied.
#[derive(Clone, Debug)]
pub struct BackfillRequest {
    pub conn: ConnId,
    pub identity: StreamIdentity,

    /// Capture-time floor; entries older than this are ignored. `None`
    /// merges everything.
    pub since: Option<i64>,
}

/// One historical entry: parsed time key (unix milliseconds) plus the raw
/// log line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackfillEntry {
    pub time: i64,
    pub raw: String,
}

/// Response shape of the recent-log endpoint: raw lines keyed by time
#[derive(Debug, Deserialize)]
struct RecentLogs {
    #[serde(default)]
    logs: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    url: &'a str,
}

/// One-shot fetch of the recent-log history for a stream identity
#[derive(Clone)]
pub struct BackfillClient {
    http: reqwest::Client,
    recent_base: String,
    proxy: Option<String>,
}

impl BackfillClient {
    /// `recent_base` carries scheme, host, and the recent path, e.g.
    /// `https://example.com/recent`. With a proxy set, requests go out as
    /// `POST <proxy>` carrying `{ "url": ... }` and the proxy answers with
    /// the verbatim upstream body.
    pub fn new(recent_base: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            recent_base: recent_base.into(),
            proxy,
        }
    }

    pub async fn fetch_recent(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Vec<BackfillEntry>, StreamError> {
        let url = format!("{}/{}", self.recent_base.trim_end_matches('/'), identity);

        let response = match &self.proxy {
            Some(proxy) => {
                self.http
                    .post(proxy)
                    .json(&ProxyRequest { url: &url })
                    .send()
                    .await?
            }
            None => self.http.get(&url).send().await?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::BackfillStatus(status.as_u16()));
        }

        let body: RecentLogs = response.json().await?;
        Ok(Self::entries(body.logs))
    }

    /// Flatten the keyed map into entries sorted ascending by time key.
    /// Entries with unreadable time keys or non-text bodies are skipped.
    fn entries(logs: Map<String, Value>) -> Vec<BackfillEntry> {
        let mut entries: Vec<BackfillEntry> = logs
            .into_iter()
            .filter_map(|(key, value)| {
                let Some(time) = parse_time_key(&key) else {
                    tracing::debug!(%key, "skipping recent log entry with unreadable time key");
                    return None;
                };
                let Value::String(raw) = value else {
                    tracing::debug!(%key, "skipping recent log entry with non-text body");
                    return None;
                };
                Some(BackfillEntry { time, raw })
            })
            .collect();
        entries.sort_by_key(|entry| entry.time);
        entries
    }
}

/// Parse a history map key as unix milliseconds, numeric or RFC 3339
fn parse_time_key(key: &str) -> Option<i64> {
    if let Ok(millis) = key.parse::<i64>() {
        return Some(millis);
    }
    DateTime::parse_from_rfc3339(key)
        .ok()
        .map(|instant| instant.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&data[..header_end]).to_string();
                let content_length = headers
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    /// Answer one request with a canned JSON body, returning what was read
    async fn respond_json(listener: TcpListener, status_line: &str, body: String) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        request
    }

    #[tokio::test]
    async fn test_fetch_recent_direct() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = json!({
            "logs": {
                "1700000000500": "third line",
                "not-a-time": "dropped",
                "1700000000100": "first line",
                "1700000000200": 17,
                "2023-11-14T22:13:20.300Z": "second line"
            }
        })
        .to_string();
        let server = tokio::spawn(respond_json(listener, "200 OK", body));

        let client = BackfillClient::new(format!("http://{addr}/recent"), None);
        let entries = client
            .fetch_recent(&StreamIdentity::new("rTestAccount1"))
            .await
            .unwrap();

        assert_eq!(
            entries,
            vec![
                BackfillEntry {
                    time: 1700000000100,
                    raw: "first line".to_string()
                },
                BackfillEntry {
                    time: 1700000000300,
                    raw: "second line".to_string()
                },
                BackfillEntry {
                    time: 1700000000500,
                    raw: "third line".to_string()
                },
            ]
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /recent/rTestAccount1 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_fetch_recent_via_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = json!({"logs": {"1700000000100": "proxied line"}}).to_string();
        let server = tokio::spawn(respond_json(listener, "200 OK", body));

        let client = BackfillClient::new(
            "https://upstream.example/recent",
            Some(format!("http://{addr}/api/proxy")),
        );
        let entries = client
            .fetch_recent(&StreamIdentity::new("rTestAccount1"))
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].raw, "proxied line");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/proxy HTTP/1.1"));
        assert!(request.contains("https://upstream.example/recent/rTestAccount1"));
    }

    #[tokio::test]
    async fn test_fetch_recent_non_success_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(respond_json(listener, "502 Bad Gateway", "{}".to_string()));

        let client = BackfillClient::new(format!("http://{addr}/recent"), None);
        let result = client.fetch_recent(&StreamIdentity::new("rTestAccount1")).await;

        assert!(matches!(result, Err(StreamError::BackfillStatus(502))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_recent_missing_logs_key() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(respond_json(listener, "200 OK", "{}".to_string()));

        let client = BackfillClient::new(format!("http://{addr}/recent"), None);
        let entries = client
            .fetch_recent(&StreamIdentity::new("rTestAccount1"))
            .await
            .unwrap();

        assert!(entries.is_empty());
        server.await.unwrap();
    }

    #[test]
    fn test_parse_time_key_formats() {
        assert_eq!(parse_time_key("1700000000100"), Some(1700000000100));
        assert_eq!(
            parse_time_key("2023-11-14T22:13:20.300Z"),
            Some(1700000000300)
        );
        assert_eq!(parse_time_key("five minutes ago"), None);
    }
}
