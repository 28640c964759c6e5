//! # meross-bridge-adapter-http
//!
//! Direct-local transport: every request is a signed `{header, payload}`
//! envelope POSTed to `http://{address}/config` on the device itself.
//!
//! ## Dependency rule
//! Same as other adapters: depends on `meross-bridge-app` and `meross-bridge-domain`.

mod config;
mod error;

pub use config::HttpConfig;
pub use error::HttpError;

use std::future::Future;

use meross_bridge_app::ports::DeviceTransport;
use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::TransportError;
use meross_bridge_domain::protocol::{CommandPayload, Namespace, RequestEnvelope, ResponseEnvelope};
use meross_bridge_domain::time::unix_seconds;

/// [`DeviceTransport`] reaching devices over the local network.
#[derive(Debug, Clone)]
pub struct LocalHttpTransport {
    client: reqwest::Client,
    key: String,
}

impl LocalHttpTransport {
    /// Build a transport with the configured key and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Client`] if the HTTP client cannot be created.
    pub fn new(config: &HttpConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(HttpError::Client)?;
        Ok(Self {
            client,
            key: config.key.clone(),
        })
    }

    async fn exchange(
        &self,
        url: &str,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, HttpError> {
        tracing::trace!(
            url,
            namespace = %request.header.namespace,
            message_id = %request.header.message_id,
            "posting request"
        );
        let body = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(HttpError::Request)?
            .bytes()
            .await
            .map_err(HttpError::Request)?;
        serde_json::from_slice(&body).map_err(HttpError::Decode)
    }
}

fn config_url(device: &DeviceInfo) -> Result<String, TransportError> {
    device
        .ip_address
        .as_deref()
        .filter(|address| !address.is_empty())
        .map(|address| format!("http://{address}/config"))
        .ok_or(TransportError::MissingAddress)
}

impl DeviceTransport for LocalHttpTransport {
    fn send_update(
        &self,
        device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let url = config_url(device);
        async move {
            let url = url?;
            let request = RequestEnvelope::command(command, url.as_str(), &self.key, unix_seconds());
            Ok(self.exchange(&url, &request).await?)
        }
    }

    fn request_update(
        &self,
        device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let url = config_url(device);
        async move {
            let url = url?;
            let request = RequestEnvelope::query(namespace, url.as_str(), &self.key, unix_seconds());
            Ok(self.exchange(&url, &request).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use meross_bridge_domain::command::Command;
    use meross_bridge_domain::protocol::sign;

    use super::*;

    /// Accept one connection, answer with `body`, return the raw request.
    async fn serve_once(body: Value) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let read = socket.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..read]);
                if read == 0 || request_complete(&request) {
                    break;
                }
            }
            let body = body.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(request).unwrap()
        });
        (address, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    fn device(address: Option<&str>) -> DeviceInfo {
        let builder = DeviceInfo::builder()
            .id("1912aabbccdd0011")
            .name("Desk Lamp")
            .model("MSL120");
        let builder = match address {
            Some(address) => builder.ip_address(address),
            None => builder,
        };
        builder.build().unwrap()
    }

    fn transport() -> LocalHttpTransport {
        LocalHttpTransport::new(&HttpConfig {
            key: "secret".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn should_post_signed_command_to_config_endpoint() {
        let (address, server) = serve_once(json!({
            "header": {"method": "SETACK", "namespace": "Appliance.Control.ToggleX"},
            "payload": {}
        }))
        .await;

        let response = transport()
            .send_update(
                &device(Some(&address)),
                Command::Toggle { on: true }.into_payload(0),
            )
            .await
            .unwrap();
        assert!(response.into_payload().is_ok());

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /config HTTP/1.1"));
        let body: Value = serde_json::from_str(raw.split_once("\r\n\r\n").unwrap().1).unwrap();
        assert_eq!(body["header"]["method"], "SET");
        assert_eq!(body["header"]["namespace"], "Appliance.Control.ToggleX");
        assert_eq!(body["payload"], json!({"togglex": {"channel": 0, "onoff": 1}}));
        let message_id = body["header"]["messageId"].as_str().unwrap();
        let timestamp = body["header"]["timestamp"].as_i64().unwrap();
        assert_eq!(body["header"]["sign"], sign(message_id, "secret", timestamp));
    }

    #[tokio::test]
    async fn should_send_status_query_as_get() {
        let (address, server) = serve_once(json!({
            "header": {"method": "GETACK", "namespace": "Appliance.System.Online"},
            "payload": {"online": {"status": 1}}
        }))
        .await;

        let response = transport()
            .request_update(&device(Some(&address)), Namespace::SystemOnline)
            .await
            .unwrap();
        assert_eq!(
            response.into_payload().unwrap(),
            json!({"online": {"status": 1}})
        );

        let raw = server.await.unwrap();
        let body: Value = serde_json::from_str(raw.split_once("\r\n\r\n").unwrap().1).unwrap();
        assert_eq!(body["header"]["method"], "GET");
        assert_eq!(body["payload"], json!({}));
    }

    #[tokio::test]
    async fn should_fail_without_address() {
        let result = transport()
            .request_update(&device(None), Namespace::SystemAll)
            .await;
        assert!(matches!(result, Err(TransportError::MissingAddress)));
    }

    #[tokio::test]
    async fn should_report_refused_connection_as_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = transport()
            .request_update(&device(Some(&address)), Namespace::SystemAll)
            .await;
        let err = result.unwrap_err();
        assert!(err.is_connectivity(), "unexpected {err:?}");
    }

    #[tokio::test]
    async fn should_report_garbage_body_as_decode_error() {
        let (address, _server) = serve_once(json!("not an envelope")).await;

        let result = transport()
            .request_update(&device(Some(&address)), Namespace::SystemAll)
            .await;
        assert!(matches!(result, Err(TransportError::Decode(_))));
    }
}
