//! # Config Loader
//!
//! 读取 shipper 配置文件 (TOML / JSON)，解析为 [`ShipperBlueprint`] 并做静态校验。
//!
//! 校验通过的蓝图保证：每个 sink 名字唯一，参数满足各自类型的必填/互斥约束，
//! 重试与并发设置为正数。运行期的 sink 构造不再重复这些检查。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("shipper.toml")).unwrap();
//! println!("sinks: {}", blueprint.sinks.len());
//! ```

mod parser;
mod validator;

pub use contracts::ShipperBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// 配置入口
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从文件加载，格式由后缀决定。
    ///
    /// 读取失败时错误信息带上文件路径。
    pub fn load_from_path(path: &Path) -> Result<ShipperBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| ContractError::ConfigParse {
            message: format!("{}: {e}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Self::load_from_str(&content, format)
    }

    /// 从内存中的文本加载
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ShipperBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
