// Copyright 2025 sockrpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connect, call and subscribe helpers behind the CLI subcommands.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sockrpc_client::{Endpoint, ProviderConfig, ReconnectOptions, SocketProvider, Subscription};
use std::time::Duration;
use tracing::{info, warn};

/// Connection flags shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    /// `None` keeps the provider default; `Some(0)` retries forever
    pub max_attempts: Option<u32>,
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay: Duration::from_secs(5),
            max_attempts: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SessionOptions {
    pub fn provider_config(&self) -> ProviderConfig {
        let defaults = ReconnectOptions::default();
        let max_attempts = match self.max_attempts {
            None => defaults.max_attempts,
            Some(0) => None,
            Some(n) => Some(n),
        };
        ProviderConfig::default().with_reconnect(ReconnectOptions {
            auto_reconnect: self.reconnect,
            delay: self.reconnect_delay,
            max_attempts,
        })
    }
}

/// Parses `-p` input: a JSON array is used as is, any other JSON value
/// becomes the single parameter, and an empty string means no parameters.
pub fn parse_params(raw: &str) -> Result<Vec<Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| anyhow!("Invalid JSON in params: {}", e))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Connects to `endpoint` and waits until the socket is open.
pub async fn open(endpoint: &str, options: &SessionOptions) -> Result<SocketProvider> {
    let endpoint = Endpoint::parse(endpoint)?;
    let provider = SocketProvider::from_endpoint(&endpoint, options.provider_config());
    provider.connect().await?;
    tokio::time::timeout(options.timeout, provider.wait_for_connection())
        .await
        .with_context(|| format!("timed out connecting to {}", endpoint))??;
    info!("Connected to {}", endpoint);
    Ok(provider)
}

/// Sends one request and returns its result.
pub async fn call(
    endpoint: &str,
    method: &str,
    params: Vec<Value>,
    options: &SessionOptions,
) -> Result<Value> {
    let provider = open(endpoint, options).await?;
    let result = tokio::time::timeout(options.timeout, provider.request(method, params))
        .await
        .with_context(|| format!("timed out waiting for {}", method))?;
    provider.disconnect().await;
    Ok(result?)
}

/// Streams subscription pushes into `sink` until `limit` pushes have been
/// delivered, the process is interrupted, or the connection is gone for good.
///
/// Subscriptions do not survive a reconnect; when the provider comes back the
/// subscription is opened again. Returns the number of pushes delivered.
pub async fn subscribe<F>(
    endpoint: &str,
    method: &str,
    params: Vec<Value>,
    limit: Option<usize>,
    options: &SessionOptions,
    mut sink: F,
) -> Result<usize>
where
    F: FnMut(&Value) -> Result<()>,
{
    let provider = open(endpoint, options).await?;
    let mut delivered = 0usize;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    'resubscribe: loop {
        let mut subscription = provider.subscribe(method, params.clone()).await?;
        info!("Subscribed with id {}", subscription.id());

        loop {
            if limit.is_some_and(|limit| delivered >= limit) {
                unsubscribe(&provider, &subscription).await;
                break 'resubscribe;
            }
            tokio::select! {
                push = subscription.next() => match push {
                    Some(payload) => {
                        sink(&payload)?;
                        delivered += 1;
                    }
                    None => {
                        warn!("Subscription {} ended, waiting for the connection", subscription.id());
                        tokio::time::timeout(options.timeout, provider.wait_for_connection())
                            .await
                            .context("timed out waiting for the connection to come back")?
                            .context("connection lost and not coming back")?;
                        continue 'resubscribe;
                    }
                },
                _ = &mut interrupted => {
                    info!("Interrupted");
                    unsubscribe(&provider, &subscription).await;
                    break 'resubscribe;
                }
            }
        }
    }

    provider.disconnect().await;
    Ok(delivered)
}

async fn unsubscribe(provider: &SocketProvider, subscription: &Subscription) {
    if let Err(e) = provider.unsubscribe(subscription).await {
        warn!("Failed to unsubscribe {}: {}", subscription.id(), e);
    }
}
