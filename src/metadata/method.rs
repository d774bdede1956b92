//! 查询方法缓存元数据

use serde::Serialize;

/// 键模板中的占位符
pub const KEY_PLACEHOLDER: &str = "%s";

/// 单个可缓存查询操作的元数据，注册表构建完成后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryCacheMethodMetadata {
    /// 操作ID：`Mapper.方法名`
    pub operation_id: String,
    /// 所属 Mapper
    pub mapper: String,
    /// 所属实体名
    pub entity: String,
    /// 所属实体的主键属性名
    pub id_field: String,
    /// 键模板，如 `User.id:%s`
    pub key_pattern: String,
    /// 是否为按主键查询（标准缓存项）
    pub is_pk: bool,
    /// 是否为业务唯一索引查询
    pub unique_index: bool,
    /// 返回集合
    pub collection_result: bool,
    /// 为 true 时不加防击穿锁
    pub concurrency: bool,
    /// 作用域上下文名
    pub scope_context: Option<String>,
    /// 过期时间（秒）
    pub expire_secs: u64,
    /// 所属缓存组
    pub group_key: String,
    /// 引用主键缓存的参数名
    pub ref_key: Option<String>,
    /// 二次按主键查询：用于拼接键的实体字段（按参数顺序）
    pub key_field_names: Vec<String>,
    /// 参数名（按位置）
    pub param_names: Vec<String>,
}

impl QueryCacheMethodMetadata {
    /// 结果是否通过指针引用主键缓存
    pub fn is_second_query_by_id(&self) -> bool {
        !self.key_field_names.is_empty()
    }

    /// 是否进入缓存组（主键缓存之外的都需要）
    pub fn is_group_related(&self) -> bool {
        !self.is_pk
    }

    /// 是否在键上追加租户/用户作用域
    pub fn is_scoped(&self) -> bool {
        !self.is_pk && !self.unique_index
    }

    /// 键模板中占位符之前的部分，用于按前缀清理缓存组
    pub fn key_prefix(&self) -> &str {
        self.key_pattern
            .split(KEY_PLACEHOLDER)
            .next()
            .unwrap_or(&self.key_pattern)
    }
}
