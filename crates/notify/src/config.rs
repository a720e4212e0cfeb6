//! Plugin configuration.
//!
//! Built once at bootstrap, validated, then passed around by value or `Arc`.
//! Nothing reads the environment after startup.

use std::path::PathBuf;

use postbox_core::GlobalVars;
use serde_json::Value;

use crate::delivery::queue::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_NAME, DEFAULT_RETAINED_JOBS};
use crate::delivery::DeliveryMode;
use crate::error::BootstrapError;
use crate::mailbox::{MailboxOptions, DEFAULT_MAILBOX_ROUTE};

/// Upper bound for `POSTBOX_QUEUE_CONCURRENCY`.
const MAX_CONCURRENCY: usize = 256;

/// Where dev mode writes messages when nothing else is configured.
const DEFAULT_DEV_OUTPUT_PATH: &str = "./tmp/mailbox";

/// Dev-mode settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DevConfig {
    /// Directory the file transport writes rendered messages to.
    pub output_path: PathBuf,
    /// Dev mailbox server; `None` leaves it off.
    pub mailbox: Option<MailboxOptions>,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_DEV_OUTPUT_PATH),
            mailbox: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyConfig {
    pub delivery_mode: DeliveryMode,
    pub queue_name: String,
    /// Maximum number of jobs processed at once in queued mode.
    pub concurrency: usize,
    /// Finished jobs whose state stays queryable in queued mode.
    pub retained_jobs: usize,
    /// Variables merged into every templated payload.
    pub global_vars: GlobalVars,
    pub dev: DevConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self::new(DeliveryMode::Queued)
    }
}

impl NotifyConfig {
    pub fn new(delivery_mode: DeliveryMode) -> Self {
        Self {
            delivery_mode,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            retained_jobs: DEFAULT_RETAINED_JOBS,
            global_vars: GlobalVars::new(),
            dev: DevConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Default             |
    /// |-----------------------------|---------------------|
    /// | `POSTBOX_DELIVERY_MODE`     | `queued`            |
    /// | `POSTBOX_QUEUE_NAME`        | `send-notification` |
    /// | `POSTBOX_QUEUE_CONCURRENCY` | `5`                 |
    /// | `POSTBOX_QUEUE_RETAIN`      | `1024`              |
    /// | `POSTBOX_GLOBAL_VARS`       | `{}`                |
    /// | `POSTBOX_DEV_OUTPUT_PATH`   | `./tmp/mailbox`     |
    /// | `POSTBOX_MAILBOX_PORT`      | unset (disabled)    |
    /// | `POSTBOX_MAILBOX_ROUTE`     | `mailbox`           |
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BootstrapError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let delivery_mode = match var("POSTBOX_DELIVERY_MODE") {
            Some(raw) => raw.parse()?,
            None => DeliveryMode::Queued,
        };
        let mut config = Self::new(delivery_mode);

        if let Some(name) = var("POSTBOX_QUEUE_NAME") {
            config.queue_name = name.trim().to_string();
        }
        if let Some(raw) = var("POSTBOX_QUEUE_CONCURRENCY") {
            config.concurrency = raw.trim().parse().map_err(|_| {
                BootstrapError::InvalidConfig(format!(
                    "POSTBOX_QUEUE_CONCURRENCY must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = var("POSTBOX_QUEUE_RETAIN") {
            config.retained_jobs = raw.trim().parse().map_err(|_| {
                BootstrapError::InvalidConfig(format!(
                    "POSTBOX_QUEUE_RETAIN must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = var("POSTBOX_GLOBAL_VARS") {
            config.global_vars = match serde_json::from_str(&raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    return Err(BootstrapError::InvalidConfig(
                        "POSTBOX_GLOBAL_VARS must be a JSON object".to_string(),
                    ))
                }
            };
        }
        if let Some(path) = var("POSTBOX_DEV_OUTPUT_PATH") {
            config.dev.output_path = PathBuf::from(path);
        }
        if let Some(raw) = var("POSTBOX_MAILBOX_PORT") {
            let port = raw.trim().parse().map_err(|_| {
                BootstrapError::InvalidConfig(format!(
                    "POSTBOX_MAILBOX_PORT must be a valid port, got '{raw}'"
                ))
            })?;
            let route = var("POSTBOX_MAILBOX_ROUTE")
                .unwrap_or_else(|| DEFAULT_MAILBOX_ROUTE.to_string());
            config.dev.mailbox = Some(MailboxOptions {
                port,
                route: route.trim().trim_matches('/').to_string(),
            });
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_queue(mut self, name: impl Into<String>, concurrency: usize) -> Self {
        self.queue_name = name.into();
        self.concurrency = concurrency;
        self
    }

    pub fn with_global_vars(mut self, global_vars: GlobalVars) -> Self {
        self.global_vars = global_vars;
        self
    }

    pub fn with_dev_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.dev.output_path = path.into();
        self
    }

    pub fn with_mailbox(mut self, options: MailboxOptions) -> Self {
        self.dev.mailbox = Some(options);
        self
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.queue_name.trim().is_empty() {
            return Err(BootstrapError::InvalidConfig(
                "queue name must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(BootstrapError::InvalidConfig(format!(
                "queue concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if let Some(mailbox) = &self.dev.mailbox {
            if self.delivery_mode != DeliveryMode::Dev {
                return Err(BootstrapError::InvalidConfig(format!(
                    "dev mailbox requires dev delivery mode, not {}",
                    self.delivery_mode
                )));
            }
            if mailbox.route.is_empty() || mailbox.route.contains('/') {
                return Err(BootstrapError::InvalidConfig(format!(
                    "mailbox route must be a single path segment, got '{}'",
                    mailbox.route
                )));
            }
        }
        if self.delivery_mode == DeliveryMode::Dev
            && self.dev.output_path.as_os_str().is_empty()
        {
            return Err(BootstrapError::InvalidConfig(
                "dev output path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
