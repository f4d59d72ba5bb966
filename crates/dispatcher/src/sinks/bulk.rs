//! BulkIndexAdapter - search index `_bulk` ingestion

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use contracts::{
    Batch, ContractError, DeliveryError, DeliveryLedger, Event, EventId, HttpReply, HttpTransport,
    ItemOutcome, ItemTally, RequestSigner, SignableRequest, SinkAdapter, StringTemplate,
};

use super::{required_param, timeout_param, Endpoint, SinkClient};

/// `_id` of items whose creation has not happened yet
pub const POSTPONED_ID: &str = "ID_CREATION_POSTPONED";

const BULK_URI: &str = "/_bulk";
const CONTENT_TYPE: &str = "application/x-ndjson";
const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";
const FATAL_SNIPPET_BYTES: usize = 3000;

/// Code reported for items a short response did not mention
const MISSING_ITEM: &str = "missing_item";

/// Target index naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexName {
    /// Every document goes to the same index
    Fixed(String),
    /// `<prefix>yyyy.MM.dd`, dated from the event timestamp
    Daily { prefix: String },
}

/// Configuration for BulkIndexAdapter
#[derive(Debug, Clone)]
pub struct BulkIndexSinkConfig {
    /// Cluster endpoint
    pub endpoint: Endpoint,
    /// Index or index prefix
    pub index: IndexName,
    /// Document type template
    pub doc_type: StringTemplate,
    /// Field used to date daily indices
    pub timestamp_field: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl BulkIndexSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let endpoint = Endpoint::parse(required_param(params, "url")?)?;
        let index = match (params.get("index"), params.get("index_prefix")) {
            (Some(index), None) => IndexName::Fixed(index.clone()),
            (None, Some(prefix)) => IndexName::Daily {
                prefix: prefix.clone(),
            },
            _ => {
                return Err(ContractError::config_validation(
                    "index",
                    "exactly one of 'index' or 'index_prefix' must be set",
                ))
            }
        };
        let doc_type = StringTemplate::compile(required_param(params, "type")?)?;
        let timestamp_field = params
            .get("timestamp_field")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_FIELD.to_string());

        Ok(Self {
            endpoint,
            index,
            doc_type,
            timestamp_field,
            timeout: timeout_param(params)?,
        })
    }
}

/// Caller-facing bulk result with exactly one item per submitted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    pub took: u64,
    pub items: Vec<Value>,
}

impl BulkResponse {
    /// Merge the latest per-event outcome of every event in the batch.
    ///
    /// Events the sink never answered for are rendered as postponed.
    pub fn from_ledger(batch: &Batch, ledger: &DeliveryLedger) -> Self {
        let items: Vec<Value> = batch
            .ids()
            .into_iter()
            .map(|id| {
                ledger
                    .outcome(id)
                    .and_then(ItemOutcome::detail)
                    .cloned()
                    .unwrap_or_else(postponed_item)
            })
            .collect();

        Self {
            errors: items.iter().any(|item| item_error(item).is_some()),
            took: ledger.elapsed().as_millis() as u64,
            items,
        }
    }

    /// Items still carrying an error, and postponed placeholders
    pub fn tally(&self) -> ItemTally {
        ItemTally {
            items: self.items.len(),
            errors: self.items.iter().filter(|i| item_error(i).is_some()).count(),
            postponed: self.items.iter().filter(|i| is_postponed(i)).count(),
        }
    }

    /// All-placeholder response for a batch the caller chose to defer
    pub fn postponed(batch: &Batch) -> Self {
        Self {
            errors: false,
            took: 1,
            items: (0..batch.len()).map(|_| postponed_item()).collect(),
        }
    }
}

fn postponed_item() -> Value {
    json!({ "create": { "_id": POSTPONED_ID, "status": 202 } })
}

fn is_postponed(item: &Value) -> bool {
    item.pointer("/create/_id").and_then(Value::as_str) == Some(POSTPONED_ID)
}

/// Non-null `error` of an item's action body
fn item_error(item: &Value) -> Option<&Value> {
    item.as_object()?
        .values()
        .next()?
        .get("error")
        .filter(|e| !e.is_null())
}

fn error_code(error: &Value) -> String {
    match error {
        Value::String(reason) => reason.clone(),
        other => other
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("error")
            .to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct BulkReply {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Adapter for `_bulk` indexing endpoints
pub struct BulkIndexAdapter<T> {
    name: String,
    config: BulkIndexSinkConfig,
    client: SinkClient<T>,
}

impl<T: HttpTransport + Sync> BulkIndexAdapter<T> {
    /// Create a new BulkIndexAdapter
    pub fn new(name: impl Into<String>, config: BulkIndexSinkConfig, transport: T) -> Self {
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
    pub fn config(&self) -> &BulkIndexSinkConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        self.client.transport()
    }

    fn index_for(&self, event: &Event) -> String {
        match &self.config.index {
            IndexName::Fixed(index) => index.clone(),
            IndexName::Daily { prefix } => {
                format!("{prefix}{}", self.index_date(event).format("%Y.%m.%d"))
            }
        }
    }

    fn index_date(&self, event: &Event) -> NaiveDate {
        let field = &self.config.timestamp_field;
        let Some(raw) = event.value_as_string(field) else {
            return Utc::now().date_naive();
        };
        match raw
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        {
            Some(date) => date,
            None => {
                warn!(sink = %self.name, field = %field, "Unparsable timestamp, using today's index");
                Utc::now().date_naive()
            }
        }
    }

    fn action_line(&self, event: &Event) -> Result<Value, DeliveryError> {
        let doc_type = self.config.doc_type.format(event).ok_or_else(|| {
            DeliveryError::configuration(
                &self.name,
                format!("invalid value for type '{}'", self.config.doc_type),
            )
        })?;
        Ok(json!({ "index": { "_index": self.index_for(event), "_type": doc_type } }))
    }
}

impl<T> SinkAdapter for BulkIndexAdapter<T>
where
    T: HttpTransport + Send + Sync + 'static,
{
    type Output = BulkResponse;

    fn name(&self) -> &str {
        &self.name
    }

    /// Serialized action line of every event
    type Prepared = Vec<Bytes>;

    #[instrument(name = "bulk_adapter_prepare", skip_all, fields(sink = %self.name, items = batch.len()))]
    fn prepare(&self, batch: &Batch) -> Result<Vec<Bytes>, DeliveryError> {
        batch
            .events()
            .iter()
            .map(|event| {
                serde_json::to_vec(&self.action_line(event)?)
                    .map(Bytes::from)
                    .map_err(|e| {
                        DeliveryError::configuration(&self.name, format!("serialize error: {e}"))
                    })
            })
            .collect()
    }

    #[instrument(name = "bulk_adapter_build", skip_all, fields(sink = %self.name, items = ids.len()))]
    fn build(
        &self,
        batch: &Batch,
        actions: &Vec<Bytes>,
        ids: &[EventId],
    ) -> Result<SignableRequest, DeliveryError> {
        let mut body = BytesMut::new();
        for &id in ids {
            let (event, action) = batch.get(id).zip(actions.get(id.index())).ok_or_else(|| {
                DeliveryError::configuration(&self.name, format!("event {id} not in batch"))
            })?;
            body.put_slice(action);
            body.put_u8(b'\n');
            body.put_slice(event.raw());
            body.put_u8(b'\n');
        }

        Ok(
            SignableRequest::post(&self.config.endpoint.base, BULK_URI, body.freeze())
                .with_header("Content-Type", CONTENT_TYPE)
                .with_header("host", &self.config.endpoint.host),
        )
    }

    async fn dispatch(&self, request: &mut SignableRequest) -> Result<HttpReply, DeliveryError> {
        self.client.send(&self.name, request).await
    }

    fn parse(
        &self,
        request: &SignableRequest,
        ids: &[EventId],
        reply: HttpReply,
    ) -> Result<Vec<ItemOutcome>, DeliveryError> {
        match reply.status {
            200 => {}
            400 => {
                return Err(DeliveryError::FatalRequest {
                    sink: self.name.clone(),
                    status: reply.status,
                    body: reply.body_text(),
                    request_snippet: request.payload_snippet(FATAL_SNIPPET_BYTES),
                })
            }
            status => {
                return Err(DeliveryError::transport(
                    &self.name,
                    format!("unexpected status {status}: {}", reply.body_text()),
                ))
            }
        }

        let response: BulkReply = serde_json::from_slice(&reply.body).map_err(|e| {
            DeliveryError::transport(&self.name, format!("invalid bulk response: {e}"))
        })?;
        debug!(
            sink = %self.name,
            errors = response.errors,
            items = response.items.len(),
            "Bulk response"
        );

        let mut items = response.items.into_iter();
        let outcomes = ids
            .iter()
            .map(|_| match items.next() {
                Some(item) => match item_error(&item).map(error_code) {
                    Some(code) => ItemOutcome::Retryable {
                        code,
                        detail: Some(item),
                    },
                    None => ItemOutcome::Success { detail: Some(item) },
                },
                None => ItemOutcome::retryable(MISSING_ITEM),
            })
            .collect();
        Ok(outcomes)
    }

    fn finish(&self, batch: &Batch, ledger: &DeliveryLedger) -> BulkResponse {
        BulkResponse::from_ledger(batch, ledger)
    }

    fn tally(&self, output: &BulkResponse) -> ItemTally {
        output.tally()
    }
}
