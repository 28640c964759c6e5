//! MQTT relay configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the MQTT relay transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// Account user id; part of the reply topic and the default username.
    pub user_id: String,
    /// Application id; part of the client id and the reply topic.
    pub app_id: String,
    /// Shared account key, used for request signatures and the default password.
    pub key: String,
    /// Broker username. Defaults to `user_id`.
    pub username: Option<String>,
    /// Broker password. Defaults to `md5(user_id + key)`.
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// How long to wait for a device reply, in seconds.
    pub response_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            user_id: String::new(),
            app_id: "meross-bridge".to_string(),
            key: String::new(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            response_timeout_secs: 10,
        }
    }
}

impl MqttConfig {
    /// MQTT client identifier.
    #[must_use]
    pub fn client_id(&self) -> String {
        format!("app:{}", self.app_id)
    }

    /// Topic on which devices publish replies for this client.
    #[must_use]
    pub fn reply_topic(&self) -> String {
        format!("/app/{}-{}/subscribe", self.user_id, self.app_id)
    }

    /// Effective broker credentials.
    #[must_use]
    pub fn credentials(&self) -> (String, String) {
        let username = self.username.clone().unwrap_or_else(|| self.user_id.clone());
        let password = self.password.clone().unwrap_or_else(|| {
            format!("{:x}", md5::compute(format!("{}{}", self.user_id, self.key)))
        });
        (username, password)
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}
