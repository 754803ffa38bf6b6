use serde::Deserialize;

use crate::broker::queue::OverflowPolicy;
use crate::broker::topic::ResubscribePolicy;

/// Top-level configuration settings for the application.
///
/// Includes settings for the listening sockets, the broker's delivery
/// policies and logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Address the broker binds. TCP (subscribers) and UDP (publishers) share
/// the same port.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Delivery policies.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Bound on each subscriber's store-and-forward queue; 0 means unbounded.
    pub max_pending_per_subscriber: usize,
    pub overflow: OverflowPolicy,
    pub resubscribe: ResubscribePolicy,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_pending_per_subscriber: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
    pub resubscribe: Option<ResubscribePolicy>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                max_pending_per_subscriber: 10_000,
                overflow: OverflowPolicy::DropOldest,
                resubscribe: ResubscribePolicy::Replace,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay whatever was provided on top of `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let logging = self.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                max_pending_per_subscriber: broker
                    .as_ref()
                    .and_then(|b| b.max_pending_per_subscriber)
                    .unwrap_or(default.broker.max_pending_per_subscriber),
                overflow: broker
                    .as_ref()
                    .and_then(|b| b.overflow)
                    .unwrap_or(default.broker.overflow),
                resubscribe: broker
                    .as_ref()
                    .and_then(|b| b.resubscribe)
                    .unwrap_or(default.broker.resubscribe),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
