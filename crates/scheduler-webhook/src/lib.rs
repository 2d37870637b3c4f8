//! Execution Trigger (spec §4.6): when the kernel unblocks the next spec in
//! a plan, something has to tell the executor to start running it. This
//! crate is that notification — a signed, fire-and-forget POST — and
//! nothing more; it has no opinion about what the executor does with it and
//! never blocks the caller or the transaction that unblocked the spec.
//!
//! Delivery is best-effort by design (spec §4.6, "Non-goals: delivery
//! guarantees"): a dropped trigger is recoverable because the plan's status
//! projection still shows the spec as `running`, and whatever drives the
//! executor can poll `GET /plans/{id}` to notice a stuck spec.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Configuration for the execution trigger. Disabled by default, the way
/// the teacher's own webhook integration defaults to off until a URL is
/// configured (`scheduler-config`'s `execution_enabled` maps here).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub signing_secret: Option<String>,
    #[serde(with = "duration_millis")]
    pub timeout: std::time::Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            signing_secret: None,
            timeout: std::time::Duration::from_secs(10),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Body POSTed to the configured executor when a spec becomes runnable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecTrigger {
    pub plan_id: String,
    pub spec_index: u32,
    pub purpose: String,
    pub vision: String,
    #[serde(default)]
    pub must: Vec<String>,
    #[serde(default)]
    pub dont: Vec<String>,
    #[serde(default)]
    pub nice: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TriggerEnvelope {
    triggered_at: DateTime<Utc>,
    #[serde(flatten)]
    spec: SpecTrigger,
}

/// Sends signed execution triggers without blocking the caller.
#[derive(Clone)]
pub struct TriggerClient {
    client: reqwest::Client,
    config: TriggerConfig,
}

impl TriggerClient {
    pub fn new(config: TriggerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    /// Fire `spec` at the configured executor. Returns immediately; delivery
    /// happens on a spawned task and failures are only logged (spec §4.6,
    /// "never blocks the caller").
    pub fn fire(&self, spec: SpecTrigger) {
        if !self.config.enabled {
            return;
        }
        let Some(url) = self.config.url.clone() else {
            tracing::warn!("execution trigger enabled without a url; dropping trigger");
            return;
        };

        let client = self.client.clone();
        let secret = self.config.signing_secret.clone();
        let plan_id = spec.plan_id.clone();
        let spec_index = spec.spec_index;

        tokio::spawn(async move {
            let envelope = TriggerEnvelope {
                triggered_at: Utc::now(),
                spec,
            };
            if let Err(err) = deliver(&client, &url, secret.as_deref(), &envelope).await {
                tracing::warn!(plan_id, spec_index, error = %err, "execution trigger delivery failed");
            }
        });
    }
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    secret: Option<&str>,
    envelope: &TriggerEnvelope,
) -> Result<(), String> {
    let body = serde_json::to_vec(envelope).map_err(|e| e.to_string())?;

    let mut request = client
        .post(url)
        .header("Content-Type", "application/json");

    if let Some(secret) = secret {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");
        mac.update(&body);
        let signature = hex::encode(mac.finalize().into_bytes());
        request = request.header("X-Scheduler-Signature", format!("sha256={signature}"));
    }

    let response = request
        .body(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        return Err(format!("executor returned {}", response.status()));
    }
    Ok(())
}
