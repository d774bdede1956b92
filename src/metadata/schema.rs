//! 声明式实体缓存描述
//!
//! 每个参与自动缓存的实体用一个 [`EntitySchema`] 描述：
//! 主键、字段、声明了缓存的查询方法，以及自定义的变更方法。
//! 标准 CRUD 方法由注册表自动补齐，无需声明

use crate::types::SqlCommandType;
use serde::{Deserialize, Serialize};

/// 标准 CRUD 方法名
pub mod crud_methods {
    pub const INSERT: &str = "insert";
    pub const INSERT_SELECTIVE: &str = "insertSelective";
    pub const UPDATE_BY_PRIMARY_KEY: &str = "updateByPrimaryKey";
    pub const UPDATE_BY_PRIMARY_KEY_SELECTIVE: &str = "updateByPrimaryKeySelective";
    pub const DELETE_BY_PRIMARY_KEY: &str = "deleteByPrimaryKey";
    pub const BATCH_UPDATE_BY_PRIMARY_KEYS: &str = "batchUpdateByPrimaryKeys";
    pub const SELECT_BY_PRIMARY_KEY: &str = "selectByPrimaryKey";

    /// 按主键变更的方法
    pub const BY_PRIMARY_KEY: [&str; 5] = [
        INSERT,
        INSERT_SELECTIVE,
        UPDATE_BY_PRIMARY_KEY,
        UPDATE_BY_PRIMARY_KEY_SELECTIVE,
        DELETE_BY_PRIMARY_KEY,
    ];

    /// 按主键列表批量变更的方法
    pub const BATCH_BY_PRIMARY_KEYS: [&str; 1] = [BATCH_UPDATE_BY_PRIMARY_KEYS];
}

/// 查询方法的返回形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnShape {
    /// 单个所属实体
    Entity,
    /// 所属实体列表
    EntityList,
    /// 单个其他值（计数、投影等）
    Value,
    /// 其他值的列表
    ValueList,
}

impl ReturnShape {
    pub fn is_collection(&self) -> bool {
        matches!(self, ReturnShape::EntityList | ReturnShape::ValueList)
    }
}

/// 查询方法的缓存选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// 过期时间（秒），None 时使用全局默认值
    pub expire_secs: Option<u64>,
    /// 为 true 时不加防击穿锁，允许并发重复查询
    pub concurrency: bool,
    /// 按当前用户隔离缓存
    pub user_scope: bool,
    /// 按命名的上下文值隔离缓存
    pub scope_context: Option<String>,
    /// 查询条件是业务唯一索引
    pub unique_index: bool,
    /// 引用主键缓存的参数名
    pub ref_key: Option<String>,
    /// 触发本查询缓存失效的变更方法
    ///
    /// 支持 `*`（同一 Mapper 的全部变更方法）、`方法名`、`Mapper.方法名`、`Mapper.*`
    pub evict_on_methods: Vec<String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expire_secs(mut self, secs: u64) -> Self {
        self.expire_secs = Some(secs);
        self
    }

    pub fn concurrency(mut self) -> Self {
        self.concurrency = true;
        self
    }

    pub fn user_scope(mut self) -> Self {
        self.user_scope = true;
        self
    }

    pub fn scope_context(mut self, name: &str) -> Self {
        self.scope_context = Some(name.to_string());
        self
    }

    pub fn unique_index(mut self) -> Self {
        self.unique_index = true;
        self
    }

    pub fn ref_key(mut self, param: &str) -> Self {
        self.ref_key = Some(param.to_string());
        self
    }

    pub fn evict_on(mut self, methods: &[&str]) -> Self {
        self.evict_on_methods
            .extend(methods.iter().map(|m| m.to_string()));
        self
    }
}

/// 声明了缓存的查询方法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDeclaration {
    /// 方法名
    pub method: String,
    /// 参数名（按位置）
    #[serde(default)]
    pub params: Vec<String>,
    /// 返回形态
    pub return_shape: ReturnShape,
    /// 缓存选项
    #[serde(default)]
    pub options: CacheOptions,
}

impl QueryDeclaration {
    pub fn new(method: &str, params: &[&str], return_shape: ReturnShape) -> Self {
        Self {
            method: method.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            return_shape,
            options: CacheOptions::default(),
        }
    }

    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }
}

/// 自定义变更方法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationDeclaration {
    pub method: String,
    pub command: SqlCommandType,
}

impl MutationDeclaration {
    pub fn new(method: &str, command: SqlCommandType) -> Self {
        Self {
            method: method.to_string(),
            command,
        }
    }
}

/// 实体缓存描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// 实体名，用作缓存键前缀
    pub entity: String,
    /// Mapper 名，操作ID为 `Mapper.方法名`
    pub mapper: String,
    /// 表名
    pub table: String,
    /// 主键属性名
    pub id_field: String,
    /// 主键列名
    pub id_column: String,
    /// 实体属性名
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub queries: Vec<QueryDeclaration>,
    #[serde(default)]
    pub mutations: Vec<MutationDeclaration>,
    /// 整个 Mapper 不参与自动缓存
    #[serde(default)]
    pub cache_ignore: bool,
}

impl EntitySchema {
    /// 创建实体描述，主键默认为 `id` 列
    pub fn new(entity: &str, mapper: &str, table: &str) -> Self {
        Self {
            entity: entity.to_string(),
            mapper: mapper.to_string(),
            table: table.to_string(),
            id_field: "id".to_string(),
            id_column: "id".to_string(),
            fields: vec!["id".to_string()],
            queries: Vec::new(),
            mutations: Vec::new(),
            cache_ignore: false,
        }
    }

    pub fn id(mut self, field: &str, column: &str) -> Self {
        self.fields.retain(|f| f != &self.id_field);
        self.id_field = field.to_string();
        self.id_column = column.to_string();
        if !self.fields.iter().any(|f| f == field) {
            self.fields.insert(0, field.to_string());
        }
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        for field in fields {
            if !self.fields.iter().any(|f| f == field) {
                self.fields.push(field.to_string());
            }
        }
        self
    }

    pub fn query(mut self, query: QueryDeclaration) -> Self {
        self.queries.push(query);
        self
    }

    pub fn mutation(mut self, method: &str, command: SqlCommandType) -> Self {
        self.mutations.push(MutationDeclaration::new(method, command));
        self
    }

    pub fn cache_ignore(mut self) -> Self {
        self.cache_ignore = true;
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }
}
