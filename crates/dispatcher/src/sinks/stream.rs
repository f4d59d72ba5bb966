//! StreamAdapter - Kinesis-style PutRecords ingestion

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use contracts::{
    Batch, ContractError, DeliveryError, DeliveryLedger, Event, EventId, HttpReply, HttpTransport,
    ItemOutcome, ItemTally, RequestSigner, SignableRequest, SinkAdapter, StringTemplate,
};

use super::{required_param, timeout_param, Endpoint, SinkClient};

const TARGET_HEADER: &str = "X-Amz-Target";
const PUT_RECORDS_TARGET: &str = "Kinesis_20131202.PutRecords";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Code reported for records a short response did not mention
const MISSING_RECORD: &str = "MissingRecord";

/// Configuration for StreamAdapter
#[derive(Debug, Clone)]
pub struct StreamSinkConfig {
    /// Service endpoint
    pub endpoint: Endpoint,
    /// Target stream name
    pub stream: String,
    /// Partition key template; `None` means a random key per event
    pub partition_key: Option<StringTemplate>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl StreamSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let endpoint = Endpoint::parse(required_param(params, "url")?)?;
        let stream = required_param(params, "stream")?.to_string();
        let partition_key = params
            .get("partition_key")
            .map(|t| StringTemplate::compile(t))
            .transpose()?;

        Ok(Self {
            endpoint,
            stream,
            partition_key,
            timeout: timeout_param(params)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsRequest<'a> {
    stream_name: &'a str,
    records: Vec<PutRecordsEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsEntry {
    data: String,
    partition_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsResponse {
    #[serde(default)]
    failed_record_count: u64,
    #[serde(default)]
    records: Vec<PutRecordsResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsResult {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Adapter for stream ingestion endpoints.
///
/// Record failures are always retryable; the caller gets the original batch back.
pub struct StreamAdapter<T> {
    name: String,
    config: StreamSinkConfig,
    client: SinkClient<T>,
}

impl<T: HttpTransport + Sync> StreamAdapter<T> {
    /// Create a new StreamAdapter
    pub fn new(name: impl Into<String>, config: StreamSinkConfig, transport: T) -> Self {
        Self {
            name: name.into(),
            config,
            client: SinkClient::new(transport),
        }
    }

    /// Attach a request signer
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.client = self.client.with_signer(signer);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &StreamSinkConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        self.client.transport()
    }

    fn partition_key(&self, event: &Event) -> String {
        self.config
            .partition_key
            .as_ref()
            .and_then(|template| template.format(event))
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

impl<T> SinkAdapter for StreamAdapter<T>
where
    T: HttpTransport + Send + Sync + 'static,
{
    type Output = Batch;
    /// Partition key of every event, fixed for the whole delivery
    type Prepared = Vec<String>;

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, batch: &Batch) -> Result<Vec<String>, DeliveryError> {
        Ok(batch
            .events()
            .iter()
            .map(|event| self.partition_key(event))
            .collect())
    }

    #[instrument(name = "stream_adapter_build", skip_all, fields(sink = %self.name, items = ids.len()))]
    fn build(
        &self,
        batch: &Batch,
        keys: &Vec<String>,
        ids: &[EventId],
    ) -> Result<SignableRequest, DeliveryError> {
        let records = ids
            .iter()
            .map(|&id| {
                let (event, key) = batch.get(id).zip(keys.get(id.index())).ok_or_else(|| {
                    DeliveryError::configuration(&self.name, format!("event {id} not in batch"))
                })?;
                Ok(PutRecordsEntry {
                    data: STANDARD.encode(event.raw()),
                    partition_key: key.clone(),
                })
            })
            .collect::<Result<Vec<_>, DeliveryError>>()?;

        let body = PutRecordsRequest {
            stream_name: &self.config.stream,
            records,
        };
        let payload = serde_json::to_vec(&body)
            .map_err(|e| DeliveryError::configuration(&self.name, format!("serialize error: {e}")))?;

        Ok(
            SignableRequest::post(&self.config.endpoint.base, "/", Bytes::from(payload))
                .with_header(TARGET_HEADER, PUT_RECORDS_TARGET)
                .with_header("Content-Type", CONTENT_TYPE)
                .with_header("host", &self.config.endpoint.host),
        )
    }

    async fn dispatch(&self, request: &mut SignableRequest) -> Result<HttpReply, DeliveryError> {
        self.client.send(&self.name, request).await
    }

    fn parse(
        &self,
        _request: &SignableRequest,
        ids: &[EventId],
        reply: HttpReply,
    ) -> Result<Vec<ItemOutcome>, DeliveryError> {
        if !reply.is_success() {
            return Err(DeliveryError::transport(
                &self.name,
                format!("unexpected status {}: {}", reply.status, reply.body_text()),
            ));
        }

        let response: PutRecordsResponse = serde_json::from_slice(&reply.body).map_err(|e| {
            DeliveryError::transport(&self.name, format!("invalid PutRecords response: {e}"))
        })?;
        debug!(
            sink = %self.name,
            failed = response.failed_record_count,
            records = response.records.len(),
            "PutRecords response"
        );

        let mut records = response.records.into_iter();
        let outcomes = ids
            .iter()
            .map(|_| match records.next() {
                Some(PutRecordsResult {
                    error_code: Some(code),
                    error_message,
                }) => ItemOutcome::Retryable {
                    code,
                    detail: error_message.map(serde_json::Value::String),
                },
                Some(_) => ItemOutcome::success(),
                None => ItemOutcome::retryable(MISSING_RECORD),
            })
            .collect();
        Ok(outcomes)
    }

    fn finish(&self, batch: &Batch, _ledger: &DeliveryLedger) -> Batch {
        batch.clone()
    }

    fn tally(&self, output: &Batch) -> ItemTally {
        ItemTally::delivered(output.len())
    }
}
