//! 配置校验模块
//!
//! 校验规则：
//! - sink 名称非空且唯一
//! - batch_size > 0, max_in_flight > 0, max_attempts >= 1
//! - sink 必填参数齐全 (url / stream / type)
//! - bulk_index: index 与 index_prefix 必须且只能配置一个

use std::collections::{HashMap, HashSet};

use contracts::{ContractError, ShipperBlueprint, SinkConfig, SinkType};

/// 校验 ShipperBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    validate_batching(blueprint)?;
    validate_sink_names(blueprint)?;
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        validate_sink_limits(idx, sink)?;
        validate_sink_params(idx, sink)?;
    }
    Ok(())
}

/// 校验批处理参数
fn validate_batching(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    if blueprint.batching.batch_size == 0 {
        return Err(ContractError::config_validation(
            "batching.batch_size",
            "batch_size must be > 0",
        ));
    }
    Ok(())
}

/// 校验 sink 名称非空且唯一
fn validate_sink_names(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// 校验并发与重试上限
fn validate_sink_limits(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    if sink.max_in_flight == 0 {
        return Err(ContractError::config_validation(
            format!("sinks[{}].max_in_flight", idx),
            "max_in_flight must be > 0",
        ));
    }
    if sink.retry.max_attempts == 0 {
        return Err(ContractError::config_validation(
            format!("sinks[{}].retry.max_attempts", idx),
            "max_attempts must be >= 1",
        ));
    }
    Ok(())
}

/// 校验类型特定参数
fn validate_sink_params(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    let params = &sink.params;
    require_param(idx, params, "url")?;

    match sink.sink_type {
        SinkType::Stream => {
            require_param(idx, params, "stream")?;
        }
        SinkType::BulkIndex => {
            require_param(idx, params, "type")?;
            let has_index = params.contains_key("index");
            let has_prefix = params.contains_key("index_prefix");
            if has_index == has_prefix {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params", idx),
                    "exactly one of 'index' or 'index_prefix' must be set",
                ));
            }
        }
    }
    Ok(())
}

fn require_param(
    idx: usize,
    params: &HashMap<String, String>,
    key: &str,
) -> Result<(), ContractError> {
    match params.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(ContractError::config_validation(
            format!("sinks[{}].params.{}", idx, key),
            format!("missing required parameter '{}'", key),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BatchingConfig, ConfigVersion, RetryConfig};

    fn bulk_sink() -> SinkConfig {
        SinkConfig {
            name: "search".into(),
            sink_type: SinkType::BulkIndex,
            max_in_flight: 4,
            retry: RetryConfig::default(),
            params: HashMap::from([
                ("url".to_string(), "http://localhost:9200".to_string()),
                ("index".to_string(), "logs".to_string()),
                ("type".to_string(), "doc".to_string()),
            ]),
        }
    }

    fn stream_sink() -> SinkConfig {
        SinkConfig {
            name: "events".into(),
            sink_type: SinkType::Stream,
            max_in_flight: 4,
            retry: RetryConfig::default(),
            params: HashMap::from([
                ("url".to_string(), "http://localhost:4567".to_string()),
                ("stream".to_string(), "events".to_string()),
            ]),
        }
    }

    fn minimal_blueprint() -> ShipperBlueprint {
        ShipperBlueprint {
            version: ConfigVersion::V1,
            batching: BatchingConfig::default(),
            sinks: vec![bulk_sink(), stream_sink()],
        }
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_duplicate_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sinks[1].name = "search".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate sink name"), "got: {err}");
    }

    #[test]
    fn test_empty_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].name = String::new();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_index_and_prefix_are_exclusive() {
        let mut bp = minimal_blueprint();
        bp.sinks[0]
            .params
            .insert("index_prefix".into(), "logs-".into());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("exactly one of"), "got: {err}");

        bp.sinks[0].params.remove("index");
        bp.sinks[0].params.remove("index_prefix");
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("exactly one of"), "got: {err}");
    }

    #[test]
    fn test_missing_type() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].params.remove("type");
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("'type'"), "got: {err}");
    }

    #[test]
    fn test_missing_stream_name() {
        let mut bp = minimal_blueprint();
        bp.sinks[1].params.insert("stream".into(), "  ".into());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("'stream'"), "got: {err}");
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].retry.max_attempts = 0;
        assert!(validate(&bp).is_err());

        let mut bp = minimal_blueprint();
        bp.sinks[1].max_in_flight = 0;
        assert!(validate(&bp).is_err());

        let mut bp = minimal_blueprint();
        bp.batching.batch_size = 0;
        assert!(validate(&bp).is_err());
    }
}
