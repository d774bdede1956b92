//! 缓存键生成模块
//!
//! 根据调用形态（实体、方法、参数值、租户/用户作用域）生成确定性的缓存键

use crate::error::AutoCacheResult;
use crate::metadata::{KEY_PLACEHOLDER, QueryCacheMethodMetadata};
use crate::types::{CallContext, CallParameter, DataValue};
use rat_logger::{debug, warn};

/// 空结果占位符
pub const NULL_PLACEHOLDER: &str = "~null";
/// 缓存组键后缀
pub const GROUPKEY_SUFFIX: &str = "~keys";
/// 缓存组成员集合后缀
pub const GROUP_MEMBERS_SUFFIX: &str = "~members";
/// 主键缓存键中间部分
pub const ID_PART_CACHEKEY: &str = ".id:";
/// 防击穿锁键前缀
pub const CONCURRENT_LOCK_PREFIX: &str = "concurrent:";
/// 当前用户作用域的上下文名
pub const CURRENT_USER_CONTEXT_NAME: &str = "currentUser";

const UNDER_LINE: &str = "_";
const AT: &str = "@";
const MAX_KEY_TEXT_LEN: usize = 64;

/// 缓存键编解码
pub struct KeyCodec;

impl KeyCodec {
    /// 生成查询缓存键
    ///
    /// 参数素材提取失败时退化为参数的 JSON 序列化，不会让调用失败
    pub fn derive_key(
        metadata: &QueryCacheMethodMetadata,
        parameter: &CallParameter,
        context: &CallContext,
    ) -> String {
        let text = match Self::parameter_text(parameter, &metadata.id_field) {
            Ok(text) => text,
            Err(e) => {
                warn!("提取缓存键参数失败，退化为JSON序列化: {}", e);
                Self::fallback_text(parameter)
            }
        };
        let key = Self::scoped(metadata, Self::fill_pattern(&metadata.key_pattern, &text), context);
        debug!("生成查询缓存键: operation={}, key={}", metadata.operation_id, key);
        key
    }

    /// 用一组字段值生成缓存键（按顺序以下划线拼接）
    ///
    /// 用于从实体结果反推二次查询方法的键
    pub fn derive_key_from_values(
        metadata: &QueryCacheMethodMetadata,
        values: &[DataValue],
        context: &CallContext,
    ) -> AutoCacheResult<String> {
        let text = Self::join_values(values)?;
        Ok(Self::scoped(
            metadata,
            Self::fill_pattern(&metadata.key_pattern, &text),
            context,
        ))
    }

    /// 主键缓存键
    ///
    /// 与读路径一致，超长主键同样折叠为 md5
    pub fn canonical_key(entity: &str, id: &str) -> String {
        format!("{}{}{}", entity, ID_PART_CACHEKEY, Self::bound_length(id.to_string()))
    }

    /// 从实体结果中取主键生成主键缓存键，主键缺失时返回 None
    pub fn canonical_key_for_row(pk_metadata: &QueryCacheMethodMetadata, row: &DataValue) -> Option<String> {
        Self::canonical_key_for_value(pk_metadata, row.get_field(&pk_metadata.id_field)?)
    }

    /// 用主键值生成主键缓存键，空值或无法渲染时返回 None
    pub fn canonical_key_for_value(pk_metadata: &QueryCacheMethodMetadata, id: &DataValue) -> Option<String> {
        if id.is_null() {
            return None;
        }
        let text = id.to_key_text().ok()?;
        Some(Self::fill_pattern(&pk_metadata.key_pattern, &Self::bound_length(text)))
    }

    /// 防击穿锁键
    pub fn lock_key(key: &str) -> String {
        format!("{}{}", CONCURRENT_LOCK_PREFIX, key)
    }

    /// 缓存组键，已带后缀时原样返回
    pub fn group_key(group_name: &str) -> String {
        if group_name.ends_with(GROUPKEY_SUFFIX) {
            group_name.to_string()
        } else {
            format!("{}{}", group_name, GROUPKEY_SUFFIX)
        }
    }

    /// 缓存组的成员集合键，控制每个成员只追加一次
    pub fn group_members_key(group_key: &str) -> String {
        format!("{}{}", group_key, GROUP_MEMBERS_SUFFIX)
    }

    /// 将键素材代入模板
    pub fn fill_pattern(pattern: &str, text: &str) -> String {
        pattern.replacen(KEY_PLACEHOLDER, text, 1)
    }

    /// 提取参数的键素材
    fn parameter_text(parameter: &CallParameter, id_field: &str) -> AutoCacheResult<String> {
        let text = match parameter {
            CallParameter::None => String::new(),
            CallParameter::Positional(values) | CallParameter::List(values) => {
                Self::join_values(values)?
            }
            CallParameter::Entity(fields) => match fields.get(id_field) {
                Some(id) if !id.is_null() && id.to_key_text()? != "0" => id.to_key_text()?,
                _ => DataValue::Object(fields.clone()).to_key_text()?,
            },
            CallParameter::Named(fields) => DataValue::Object(fields.clone()).to_key_text()?,
            CallParameter::Scalar(value) => value.to_key_text()?,
        };
        Ok(Self::bound_length(text))
    }

    fn join_values(values: &[DataValue]) -> AutoCacheResult<String> {
        let parts = values
            .iter()
            .map(|v| v.to_key_text())
            .collect::<AutoCacheResult<Vec<_>>>()?;
        Ok(Self::bound_length(parts.join(UNDER_LINE)))
    }

    fn fallback_text(parameter: &CallParameter) -> String {
        let text = serde_json::to_string(&parameter.to_data_value())
            .unwrap_or_else(|_| format!("{:?}", parameter));
        Self::bound_length(text)
    }

    /// 超过64个字符的素材折叠为 md5
    fn bound_length(text: String) -> String {
        if text.chars().count() > MAX_KEY_TEXT_LEN {
            format!("{:x}", md5::compute(text.as_bytes()))
        } else {
            text
        }
    }

    /// 非主键、非唯一索引查询追加租户与作用域后缀
    fn scoped(metadata: &QueryCacheMethodMetadata, key: String, context: &CallContext) -> String {
        if !metadata.is_scoped() {
            return key;
        }
        let mut key = key;
        if let Some(tenant_id) = &context.tenant_id {
            key.push_str(AT);
            key.push_str(tenant_id);
        }
        let scope_value = match metadata.scope_context.as_deref() {
            Some(CURRENT_USER_CONTEXT_NAME) => context.actor_id.as_deref(),
            Some(name) => context.values.get(name).map(|v| v.as_str()),
            None => None,
        };
        if let Some(value) = scope_value {
            key.push_str(AT);
            key.push_str(value);
        }
        key
    }
}
