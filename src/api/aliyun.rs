//! Aliyun DAS and R-KVStore client.
//!
//! Cache analysis jobs live in DAS (which is only served from the Shanghai
//! region), backup sets live in R-KVStore. Both are RPC-style APIs signed
//! with [`Signer`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::signer::Signer;
use super::RemoteJobService;
use crate::error::RemoteError;
use crate::export::Record;
use crate::scheduler::{AnalysisResult, JobState, JobStatus, RECENT_JOB_WINDOW};

pub const DAS_VERSION: &str = "2020-01-16";
pub const KVSTORE_VERSION: &str = "2015-01-01";

const DEFAULT_DAS_ENDPOINT: &str = "das.cn-shanghai.aliyuncs.com";
const DEFAULT_KVSTORE_ENDPOINT: &str = "r-kvstore.cn-shenzhen.aliyuncs.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H:%MZ";
const SUCCESS_CODE: &str = "200";

/// Connection settings for [`AliyunClient`].
#[derive(Debug, Clone)]
pub struct AliyunConfig {
    pub access_key_id: String,
    pub access_key_secret: String,
    /// DAS endpoint host, or a full `http(s)://` base URL.
    pub das_endpoint: String,
    /// R-KVStore endpoint host, or a full `http(s)://` base URL.
    pub kvstore_endpoint: String,
    pub timeout: Duration,
}

impl AliyunConfig {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            das_endpoint: DEFAULT_DAS_ENDPOINT.to_string(),
            kvstore_endpoint: DEFAULT_KVSTORE_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_das_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.das_endpoint = endpoint.into();
        self
    }

    pub fn with_kvstore_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.kvstore_endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    host: String,
}

impl Endpoint {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_end_matches('/');
        for scheme in ["https://", "http://"] {
            if let Some(host) = trimmed.strip_prefix(scheme) {
                return Self {
                    base_url: trimmed.to_string(),
                    host: host.to_string(),
                };
            }
        }
        Self {
            base_url: format!("https://{}", trimmed),
            host: trimmed.to_string(),
        }
    }
}

/// [`RemoteJobService`] backed by Aliyun DAS and R-KVStore.
pub struct AliyunClient {
    client: Client,
    signer: Signer,
    das: Endpoint,
    kvstore: Endpoint,
}

impl AliyunClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::MissingCredentials` if the AccessKey pair is
    /// empty, or `RemoteError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(config: AliyunConfig) -> Result<Self, RemoteError> {
        if config.access_key_id.trim().is_empty() || config.access_key_secret.trim().is_empty() {
            return Err(RemoteError::MissingCredentials(
                "Aliyun AccessKey id and secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            signer: Signer::new(config.access_key_id, config.access_key_secret),
            das: Endpoint::parse(&config.das_endpoint),
            kvstore: Endpoint::parse(&config.kvstore_endpoint),
        })
    }

    async fn call(
        &self,
        endpoint: &Endpoint,
        version: &str,
        action: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Value, RemoteError> {
        let signed = self.signer.sign(&endpoint.host, action, version, &params)?;
        let url = if signed.query.is_empty() {
            format!("{}/", endpoint.base_url)
        } else {
            format!("{}/?{}", endpoint.base_url, signed.query)
        };

        let mut request = self.client.post(&url);
        for (name, value) in &signed.headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        debug!(action = %action, host = %endpoint.host, "Calling Aliyun API");

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(format!("{}: {}", action, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::RequestFailed(format!("{}: {}", action, e)))?;

        if !status.is_success() {
            // Gateways may answer with a non-JSON body
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            return Err(RemoteError::ApiError {
                action: action.to_string(),
                code: body
                    .get("Code")
                    .and_then(scalar_string)
                    .unwrap_or_else(|| status.as_u16().to_string()),
                message: body
                    .get("Message")
                    .and_then(scalar_string)
                    .unwrap_or(text),
            });
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Decode {
            action: action.to_string(),
            message: e.to_string(),
        })
    }

    /// Calls a DAS action and returns its `Data` object after checking `Code`.
    async fn call_das(
        &self,
        action: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Value, RemoteError> {
        let body = self.call(&self.das, DAS_VERSION, action, params).await?;
        check_code(action, &body)?;
        Ok(body.get("Data").cloned().unwrap_or(Value::Null))
    }

    async fn describe_job(&self, instance_id: &str, job_id: &str) -> Result<Value, RemoteError> {
        let params = params([("InstanceId", instance_id), ("JobId", job_id)]);
        self.call_das("DescribeCacheAnalysisJob", params).await
    }

    /// Id of the most recent backup set taken within the recent job window.
    async fn latest_backup_id(&self, instance_id: &str) -> Result<String, RemoteError> {
        let end = Utc::now();
        let start = end - lookback(RECENT_JOB_WINDOW);
        let start = start.format(BACKUP_TIME_FORMAT).to_string();
        let end = end.format(BACKUP_TIME_FORMAT).to_string();
        let params = params([
            ("InstanceId", instance_id),
            ("StartTime", start.as_str()),
            ("EndTime", end.as_str()),
        ]);

        let body = self
            .call(&self.kvstore, KVSTORE_VERSION, "DescribeBackups", params)
            .await?;

        let total = body.get("TotalCount").and_then(Value::as_i64).unwrap_or(0);
        let backup_id = body
            .pointer("/Backups/Backup/0/BackupId")
            .and_then(scalar_string);

        match backup_id {
            Some(id) if total >= 1 => Ok(id),
            _ => Err(RemoteError::NoBackup {
                instance_id: instance_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteJobService for AliyunClient {
    async fn find_recent_job(
        &self,
        instance_id: &str,
        window: Duration,
    ) -> Result<Option<String>, RemoteError> {
        let end = Utc::now();
        let start = (end - lookback(window)).timestamp_millis().to_string();
        let end = end.timestamp_millis().to_string();
        let params = params([
            ("InstanceId", instance_id),
            ("StartTime", start.as_str()),
            ("EndTime", end.as_str()),
        ]);

        let data = self.call_das("DescribeCacheAnalysisJobs", params).await?;
        Ok(data
            .pointer("/List/CacheAnalysisJob/0/JobId")
            .and_then(scalar_string)
            .filter(|id| !id.is_empty()))
    }

    async fn create_job(&self, instance_id: &str) -> Result<String, RemoteError> {
        let backup_id = self.latest_backup_id(instance_id).await?;
        debug!(instance_id = %instance_id, backup_id = %backup_id, "Found latest backup set");

        let params = params([("InstanceId", instance_id), ("BackupSetId", backup_id.as_str())]);
        let data = self.call_das("CreateCacheAnalysisJob", params).await?;

        let job_id = data
            .get("JobId")
            .and_then(scalar_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RemoteError::Decode {
                action: "CreateCacheAnalysisJob".to_string(),
                message: "response has no JobId".to_string(),
            })?;

        info!(instance_id = %instance_id, job_id = %job_id, backup_id = %backup_id, "Created cache analysis job");
        Ok(job_id)
    }

    async fn job_status(&self, instance_id: &str, job_id: &str) -> Result<JobStatus, RemoteError> {
        let data = self.describe_job(instance_id, job_id).await?;

        let state = data
            .get("TaskState")
            .and_then(scalar_string)
            .ok_or_else(|| RemoteError::Decode {
                action: "DescribeCacheAnalysisJob".to_string(),
                message: "response has no TaskState".to_string(),
            })?;

        let mut status = JobStatus::new(JobState::parse(&state));
        if let Some(message) = data
            .get("Message")
            .and_then(scalar_string)
            .filter(|m| !m.is_empty())
        {
            status = status.with_message(message);
        }
        Ok(status)
    }

    async fn job_result(
        &self,
        instance_id: &str,
        job_id: &str,
    ) -> Result<AnalysisResult, RemoteError> {
        let data = self.describe_job(instance_id, job_id).await?;
        decode_analysis_result(&data)
    }
}

/// Decodes the result tables from a `DescribeCacheAnalysisJob` `Data` object.
///
/// `KeyPrefixes.Prefix` becomes the prefix table and `BigKeys.KeyInfo` the
/// big-key table. A missing or null list decodes to `None`.
pub fn decode_analysis_result(data: &Value) -> Result<AnalysisResult, RemoteError> {
    Ok(AnalysisResult::new(
        decode_table(data, "KeyPrefixes", "Prefix")?,
        decode_table(data, "BigKeys", "KeyInfo")?,
    ))
}

fn decode_table(data: &Value, outer: &str, inner: &str) -> Result<Option<Vec<Record>>, RemoteError> {
    let decode_error = |message: String| RemoteError::Decode {
        action: "DescribeCacheAnalysisJob".to_string(),
        message,
    };

    match data.get(outer).and_then(|table| table.get(inner)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record.clone()),
                other => Err(decode_error(format!(
                    "{}.{}[{}] is not an object: {}",
                    outer, inner, i, other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(decode_error(format!(
            "{}.{} is not a list: {}",
            outer, inner, other
        ))),
    }
}

/// Fails unless the DAS `Code` field is "200". It may arrive as a string or a number.
fn check_code(action: &str, body: &Value) -> Result<(), RemoteError> {
    let code = body.get("Code").and_then(scalar_string).unwrap_or_default();
    if code == SUCCESS_CODE {
        return Ok(());
    }
    Err(RemoteError::ApiError {
        action: action.to_string(),
        code,
        message: body
            .get("Message")
            .and_then(scalar_string)
            .unwrap_or_default(),
    })
}

fn lookback(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(24))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn params<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
