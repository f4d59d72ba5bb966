//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 适配器 + 投递引擎组合测试（脚本化传输层）
//! - 配置 -> Dispatcher -> 本地 HTTP 服务的 e2e 测试

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, DeliveryError, EventId};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = ConfigVersion::V1;
    }

    #[test]
    fn test_delivery_error_kinds() {
        let exhausted = DeliveryError::RetryExhausted {
            sink: "s".into(),
            attempts: 20,
            unresolved: vec![EventId::new(0)],
        };
        assert_eq!(exhausted.kind(), "retry_exhausted");
        assert_eq!(DeliveryError::Abandoned.kind(), "abandoned");
    }
}

/// Transport that replays canned replies in order and records every request
#[cfg(test)]
mod support {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use contracts::{Batch, ContractError, Event, HttpReply, HttpTransport, SignableRequest};
    use serde_json::Value;

    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<HttpReply>>,
        pub sent: Mutex<Vec<SignableRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<HttpReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<SignableRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: &SignableRequest) -> Result<HttpReply, ContractError> {
            self.sent.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ContractError::transport("script exhausted"))
        }
    }

    pub fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn batch(values: Vec<Value>) -> Batch {
        values
            .into_iter()
            .map(|v| Event::from_json(v).unwrap())
            .collect()
    }

    pub fn json_reply(status: u16, body: Value) -> HttpReply {
        HttpReply::new(status, serde_json::to_vec(&body).unwrap())
    }
}

#[cfg(test)]
mod bulk_tests {
    use std::time::Duration;

    use contracts::DeliveryError;
    use dispatcher::{BulkIndexAdapter, BulkIndexSinkConfig, DeliveryEngine, RetryPolicy};
    use serde_json::json;

    use crate::support::{batch, json_reply, params, ScriptedTransport};

    fn engine(
        extra: &[(&str, &str)],
        transport: ScriptedTransport,
    ) -> DeliveryEngine<BulkIndexAdapter<ScriptedTransport>> {
        let mut p = params(&[("url", "http://search:9200"), ("type", "{kind}")]);
        p.extend(params(extra));
        let config = BulkIndexSinkConfig::from_params(&p).unwrap();
        DeliveryEngine::new(
            BulkIndexAdapter::new("search", config, transport),
            RetryPolicy {
                max_attempts: 5,
                delay: Duration::ZERO,
            },
        )
    }

    fn created(id: &str) -> serde_json::Value {
        json!({ "index": { "_id": id, "status": 201 } })
    }

    fn rejected() -> serde_json::Value {
        json!({ "index": { "status": 429, "error": { "type": "es_rejected_execution_exception" } } })
    }

    /// 第一次部分失败，第二次只重发失败项，最终结果按原始顺序合并
    #[tokio::test]
    async fn test_partial_failure_is_merged_across_attempts() {
        let transport = ScriptedTransport::new(vec![
            json_reply(200, json!({ "errors": true, "took": 3, "items": [created("a"), rejected(), created("c")] })),
            json_reply(200, json!({ "errors": false, "took": 2, "items": [created("b")] })),
        ]);
        let engine = engine(&[("index", "logs")], transport);
        let events = batch(vec![
            json!({"kind": "doc", "n": 0}),
            json!({"kind": "doc", "n": 1}),
            json!({"kind": "doc", "n": 2}),
        ]);

        let response = engine.deliver(events).await.unwrap();
        assert!(!response.errors);
        assert_eq!(
            response.items,
            vec![created("a"), created("b"), created("c")]
        );

        let requests = engine.adapter().transport().requests();
        assert_eq!(requests.len(), 2);
        let retry_body = String::from_utf8(requests[1].payload.to_vec()).unwrap();
        assert_eq!(retry_body.lines().count(), 2);
        assert!(retry_body.contains(r#""n":1"#));
        assert_eq!(engine.metrics().retried_items(), 1);
    }

    #[tokio::test]
    async fn test_daily_index_from_timestamp() {
        let transport = ScriptedTransport::new(vec![json_reply(
            200,
            json!({ "errors": false, "items": [created("a")] }),
        )]);
        let engine = engine(&[("index_prefix", "logs-")], transport);
        let events = batch(vec![
            json!({"kind": "doc", "@timestamp": "2024-03-07T10:11:12.000Z"}),
        ]);

        engine.deliver(events).await.unwrap();
        let requests = engine.adapter().transport().requests();
        let body = String::from_utf8(requests[0].payload.to_vec()).unwrap();
        assert!(body.contains(r#""_index":"logs-2024.03.07""#), "got: {body}");
        assert_eq!(requests[0].uri, "/_bulk");
    }

    #[tokio::test]
    async fn test_missing_type_field_fails_without_request() {
        let engine = engine(&[("index", "logs")], ScriptedTransport::new(vec![]));
        let events = batch(vec![json!({"n": 0})]);

        let err = engine.deliver(events).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration { .. }));
        assert!(err.to_string().contains("{kind}"), "got: {err}");
        assert!(engine.adapter().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_bad_request_is_fatal() {
        let transport = ScriptedTransport::new(vec![json_reply(
            400,
            json!({ "error": "mapper_parsing_exception" }),
        )]);
        let engine = engine(&[("index", "logs")], transport);

        let err = engine
            .deliver(batch(vec![json!({"kind": "doc"})]))
            .await
            .unwrap_err();
        match err {
            DeliveryError::FatalRequest {
                status,
                body,
                request_snippet,
                ..
            } => {
                assert_eq!(status, 400);
                assert!(body.contains("mapper_parsing_exception"));
                assert!(request_snippet.contains(r#""_index":"logs""#));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.adapter().transport().requests().len(), 1);
    }

    /// 合并后的结果计入聚合器，摘要按 sink 汇总
    #[tokio::test]
    async fn test_aggregator_summarises_merged_results() {
        let transport = ScriptedTransport::new(vec![
            json_reply(200, json!({ "errors": false, "items": [created("a"), created("b")] })),
            json_reply(200, json!({ "errors": true, "items": [rejected()] })),
            json_reply(200, json!({ "errors": false, "items": [created("c")] })),
        ]);
        let engine = engine(&[("index", "logs")], transport);
        let mut aggregator = observability::DeliveryMetricsAggregator::new();

        for events in [
            batch(vec![json!({"kind": "doc"}), json!({"kind": "doc"})]),
            batch(vec![json!({"kind": "doc"})]),
        ] {
            let response = engine.deliver(events).await.unwrap();
            aggregator.record_success("search", response.tally(), Duration::from_millis(response.took));
        }

        let summary = aggregator.summary();
        assert_eq!(summary.sinks.len(), 1);
        let search = &summary.sinks[0];
        assert_eq!(search.delivered_batches, 2);
        assert_eq!(search.delivered_events, 3);
        assert_eq!(search.item_errors, 0);
        assert_eq!(search.postponed_items, 0);
        assert!(summary.to_string().contains("Sink: search"));
    }

    #[tokio::test]
    async fn test_completion_reports_to_late_subscriber() {
        let transport = ScriptedTransport::new(vec![json_reply(
            200,
            json!({ "errors": false, "items": [created("a")] }),
        )]);
        let engine = engine(&[("index", "logs")], transport);

        let completion = engine.submit(batch(vec![json!({"kind": "doc"})]));
        let first = completion.wait().await.unwrap();
        let second = completion.wait().await.unwrap();
        assert_eq!(first, second);
        assert!(completion.is_terminated());
    }
}

#[cfg(test)]
mod stream_tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use contracts::DeliveryError;
    use dispatcher::{DeliveryEngine, RetryPolicy, StreamAdapter, StreamSinkConfig};
    use serde_json::{json, Value};

    use crate::support::{batch, json_reply, params, ScriptedTransport};

    fn engine(
        extra: &[(&str, &str)],
        transport: ScriptedTransport,
        max_attempts: u32,
    ) -> DeliveryEngine<StreamAdapter<ScriptedTransport>> {
        let mut p = params(&[("url", "https://kinesis.local"), ("stream", "events")]);
        p.extend(params(extra));
        let config = StreamSinkConfig::from_params(&p).unwrap();
        DeliveryEngine::new(
            StreamAdapter::new("events", config, transport),
            RetryPolicy {
                max_attempts,
                delay: Duration::ZERO,
            },
        )
    }

    fn partition_keys(payload: &[u8]) -> Vec<String> {
        let body: Value = serde_json::from_slice(payload).unwrap();
        body["Records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["PartitionKey"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_random_partition_keys() {
        let transport = ScriptedTransport::new(vec![json_reply(
            200,
            json!({ "FailedRecordCount": 0, "Records": [{"SequenceNumber": "1"}, {"SequenceNumber": "2"}] }),
        )]);
        let engine = engine(&[], transport, 3);
        let events = batch(vec![json!({"a": 1}), json!({"a": 2})]);

        let delivered = engine.deliver(events.clone()).await.unwrap();
        assert_eq!(delivered, events);

        let requests = engine.adapter().transport().requests();
        let keys = partition_keys(&requests[0].payload);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.iter().collect::<HashSet<_>>().len(), 2);
        assert!(keys.iter().all(|k| k.len() == 36));
        assert_eq!(
            requests[0].headers.get("X-Amz-Target").map(String::as_str),
            Some("Kinesis_20131202.PutRecords")
        );
    }

    /// 重试时未解析事件沿用首次生成的随机分区键
    #[tokio::test]
    async fn test_random_keys_are_stable_across_retries() {
        let transport = ScriptedTransport::new(vec![
            json_reply(
                200,
                json!({ "FailedRecordCount": 1, "Records": [
                    {"SequenceNumber": "1"},
                    {"ErrorCode": "InternalFailure", "ErrorMessage": "retry"}
                ] }),
            ),
            json_reply(200, json!({ "FailedRecordCount": 0, "Records": [{"SequenceNumber": "2"}] })),
        ]);
        let engine = engine(&[], transport, 3);

        engine
            .deliver(batch(vec![json!({"a": 1}), json!({"a": 2})]))
            .await
            .unwrap();

        let requests = engine.adapter().transport().requests();
        assert_eq!(requests.len(), 2);
        let first = partition_keys(&requests[0].payload);
        let retry = partition_keys(&requests[1].payload);
        assert_eq!(retry, vec![first[1].clone()]);
    }

    #[tokio::test]
    async fn test_failed_records_exhaust_retries() {
        let failing = || {
            json_reply(
                200,
                json!({ "FailedRecordCount": 1, "Records": [
                    {"ErrorCode": "ProvisionedThroughputExceededException", "ErrorMessage": "slow down"}
                ] }),
            )
        };
        let transport = ScriptedTransport::new(vec![failing(), failing(), failing()]);
        let engine = engine(&[("partition_key", "{host}")], transport, 3);

        let err = engine
            .deliver(batch(vec![json!({"host": "web-1"})]))
            .await
            .unwrap_err();
        match err {
            DeliveryError::RetryExhausted {
                attempts,
                unresolved,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(unresolved.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let requests = engine.adapter().transport().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(partition_keys(&requests[2].payload), vec!["web-1"]);
        assert_eq!(engine.metrics().failed_batches(), 1);
    }
}

#[cfg(test)]
mod e2e_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Batch, Event};
    use dispatcher::create_dispatcher;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    /// Read one HTTP/1.1 request; returns its body
    async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
        let mut data = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            if let Some(head_end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..head_end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let body_start = head_end + 4;
                if data.len() >= body_start + length {
                    return data[body_start..body_start + length].to_vec();
                }
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return Vec::new();
            }
            data.extend_from_slice(&buf[..n]);
        }
    }

    /// Minimal `_bulk` endpoint accepting every document
    async fn spawn_bulk_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let body = read_request(&mut socket).await;
                    let docs = body.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count() / 2;
                    let items: Vec<_> = (0..docs)
                        .map(|i| json!({ "index": { "_id": i.to_string(), "status": 201 } }))
                        .collect();
                    let reply = json!({ "errors": false, "took": 1, "items": items }).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        reply.len(),
                        reply
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    /// End-to-end test: config -> Dispatcher -> local bulk endpoint
    ///
    /// 验证完整的数据流：
    /// 1. ConfigLoader 解析并校验 TOML 配置
    /// 2. Dispatcher 将每个 Batch 投递到 sink
    /// 3. 汇总统计反映全部成功投递
    #[tokio::test]
    async fn test_e2e_bulk_pipeline() {
        let url = spawn_bulk_server().await;
        let toml = format!(
            r#"
[batching]
batch_size = 2

[[sinks]]
name = "search"
sink_type = "bulk_index"
max_in_flight = 2

[sinks.params]
url = "{url}"
index_prefix = "logs-"
type = "{{kind}}"
"#
        );
        let blueprint = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.batching.batch_size, 2);

        let (tx, rx) = mpsc::channel::<Batch>(4);
        let dispatcher = create_dispatcher(blueprint.sinks, rx).unwrap();
        let handle = dispatcher.spawn();

        for chunk in 0..3 {
            let batch: Batch = (0..2)
                .map(|i| {
                    Event::from_json(json!({
                        "kind": "doc",
                        "@timestamp": "2024-01-02T03:04:05Z",
                        "seq": chunk * 2 + i,
                    }))
                    .unwrap()
                })
                .collect();
            tx.send(batch).await.unwrap();
        }
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.batches, 3);
        assert!(!summary.has_failures());

        let (name, snapshot) = &summary.sinks[0];
        assert_eq!(name, "search");
        assert_eq!(snapshot.delivered_batches, 3);
        assert_eq!(snapshot.delivered_events, 6);
        assert_eq!(snapshot.dispatch_count, 3);
        assert_eq!(snapshot.in_flight, 0);

        let sink = &summary.metrics.sinks[0];
        assert_eq!(sink.delivered_events, 6);
        assert_eq!(sink.failed_batches, 0);
    }
}
