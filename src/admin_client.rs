//! Admin-API client: a thin wrapper over the Caddy-compatible admin
//! HTTP API used by the apply orchestrator. Kept behind a trait so orchestrator
//! tests never touch a real socket.

use eyre::{Context, Result};

use crate::config::document::Config;

pub trait AdminClient: Send + Sync {
    /// `POST /load` with the full config document, replacing the running one.
    async fn load(&self, config: &Config) -> Result<()>;

    /// `GET /config/` — the currently running config, used for rollback
    /// comparison and diagnostics.
    async fn get_config(&self) -> Result<Config>;

    /// A lightweight reachability check, used before attempting `load`.
    async fn ping(&self) -> Result<bool>;
}

pub struct HttpAdminClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAdminClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }
}

impl AdminClient for HttpAdminClient {
    async fn load(&self, config: &Config) -> Result<()> {
        let url = format!("{}/load", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(config)
            .send()
            .await
            .wrap_err("failed to reach admin API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("admin API rejected config: {status}: {body}");
        }
        Ok(())
    }

    async fn get_config(&self) -> Result<Config> {
        let url = format!("{}/config/", self.base_url.trim_end_matches('/'));
        self.client
            .get(&url)
            .send()
            .await
            .wrap_err("failed to reach admin API")?
            .json::<Config>()
            .await
            .wrap_err("admin API returned an unparseable config")
    }

    async fn ping(&self) -> Result<bool> {
        let url = format!("{}/config/", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::{AdminClient, Config, Result};
    use std::sync::Mutex;

    /// Records every `load` call and returns scripted responses, for
    /// orchestrator tests that must not reach a real admin API.
    #[derive(Default)]
    pub struct FakeAdminClient {
        pub loaded: Mutex<Vec<Config>>,
        /// Number of upcoming `load` calls that should still fail. Decrements
        /// on every call, successful or not, so a test can simulate a
        /// transient outage that clears before a rollback attempt.
        pub load_failures_remaining: Mutex<u32>,
        pub running_config: Mutex<Option<Config>>,
        pub ping_ok: bool,
    }

    impl FakeAdminClient {
        #[must_use]
        pub fn new() -> Self {
            Self { ping_ok: true, ..Self::default() }
        }

        /// A client whose `load` calls always fail.
        #[must_use]
        pub fn failing() -> Self {
            Self { load_failures_remaining: Mutex::new(u32::MAX), ping_ok: true, ..Self::default() }
        }

        /// A client whose next `count` `load` calls fail before it starts
        /// succeeding again.
        #[must_use]
        pub fn failing_next(count: u32) -> Self {
            Self { load_failures_remaining: Mutex::new(count), ping_ok: true, ..Self::default() }
        }
    }

    impl AdminClient for FakeAdminClient {
        async fn load(&self, config: &Config) -> Result<()> {
            let mut remaining = self.load_failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                eyre::bail!("simulated admin API failure");
            }
            drop(remaining);
            self.loaded.lock().unwrap().push(config.clone());
            *self.running_config.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        async fn get_config(&self) -> Result<Config> {
            self.running_config
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| eyre::eyre!("no config has been loaded yet"))
        }

        async fn ping(&self) -> Result<bool> {
            Ok(self.ping_ok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeAdminClient;
    use super::AdminClient;
    use crate::config::document::{Apps, Config, HttpApp, Logging, LoggingLogs, AccessLog, LogWriter, Storage};
    use std::collections::BTreeMap;

    fn sample_config() -> Config {
        Config {
            apps: Apps { http: HttpApp { servers: BTreeMap::new() }, tls: None, security: None },
            logging: Logging {
                logs: LoggingLogs {
                    access: AccessLog {
                        level: "INFO".into(),
                        writer: LogWriter {
                            output: "file".into(),
                            filename: "/tmp/access.log".into(),
                            roll: true,
                            roll_size_mb: 10,
                            roll_keep: 5,
                            roll_keep_days: 7,
                        },
                        encoder: "json".into(),
                        include: vec!["http.log.access.access_log".into()],
                    },
                },
            },
            storage: Storage { module: "file_system".into(), root: "/data".into() },
        }
    }

    #[tokio::test]
    async fn fake_client_records_loaded_config() {
        let client = FakeAdminClient::new();
        client.load(&sample_config()).await.unwrap();
        assert_eq!(client.loaded.lock().unwrap().len(), 1);
        assert_eq!(client.get_config().await.unwrap(), sample_config());
    }

    #[tokio::test]
    async fn fake_client_simulates_failure() {
        let client = FakeAdminClient::failing();
        assert!(client.load(&sample_config()).await.is_err());
    }

    #[tokio::test]
    async fn get_config_before_any_load_is_an_error() {
        let client = FakeAdminClient::new();
        assert!(client.get_config().await.is_err());
    }
}
