//! 单次数据访问调用的形态描述
//!
//! 参数形态、调用上下文、绑定SQL以及执行结果

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::DataValue;

/// SQL 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlCommandType {
    Select,
    Insert,
    Update,
    Delete,
}

impl SqlCommandType {
    /// 是否为变更类命令
    pub fn is_mutation(&self) -> bool {
        !matches!(self, SqlCommandType::Select)
    }
}

/// 调用参数
///
/// 对应数据访问方法的入参形态，决定缓存键素材的提取方式
#[derive(Debug, Clone, PartialEq)]
pub enum CallParameter {
    /// 无参数
    None,
    /// 多参数方法的位置参数（param1..paramN），按顺序拼接
    Positional(Vec<DataValue>),
    /// 非位置的参数映射
    Named(HashMap<String, DataValue>),
    /// 实体对象（带主键字段）
    Entity(HashMap<String, DataValue>),
    /// 数组参数
    List(Vec<DataValue>),
    /// 单值参数
    Scalar(DataValue),
}

impl CallParameter {
    /// 单值参数快捷构造
    pub fn scalar<V: Into<DataValue>>(value: V) -> Self {
        CallParameter::Scalar(value.into())
    }

    /// 位置参数快捷构造
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DataValue>,
    {
        CallParameter::Positional(values.into_iter().map(Into::into).collect())
    }

    /// 按参数名读取参数值
    ///
    /// 位置参数需要配合方法声明的参数名列表才能按名访问
    pub fn lookup(&self, name: &str, param_names: &[String]) -> Option<&DataValue> {
        match self {
            CallParameter::Named(map) | CallParameter::Entity(map) => map.get(name),
            CallParameter::Positional(values) => param_names
                .iter()
                .position(|n| n == name)
                .and_then(|idx| values.get(idx)),
            CallParameter::Scalar(value) if param_names.len() == 1 && param_names[0] == name => {
                Some(value)
            }
            _ => None,
        }
    }

    /// 转换为 DataValue，便于兜底序列化
    pub fn to_data_value(&self) -> DataValue {
        match self {
            CallParameter::None => DataValue::Null,
            CallParameter::Positional(values) | CallParameter::List(values) => {
                DataValue::Array(values.clone())
            }
            CallParameter::Named(map) | CallParameter::Entity(map) => DataValue::Object(map.clone()),
            CallParameter::Scalar(value) => value.clone(),
        }
    }
}

/// 调用上下文
///
/// 显式携带原本来自线程上下文的信息：是否强制走主库、租户、当前用户
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    /// 事务内/强制主库读取，跳过缓存
    pub force_primary: bool,
    /// 当前租户
    pub tenant_id: Option<String>,
    /// 当前操作人
    pub actor_id: Option<String>,
    /// 其他命名的上下文值（自定义作用域参数）
    pub values: HashMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_actor<S: Into<String>>(mut self, actor_id: S) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_value<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn force_primary(mut self, force: bool) -> Self {
        self.force_primary = force;
        self
    }
}

/// 绑定参数后的SQL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundSql {
    /// 带 `?` 占位符的SQL
    pub sql: String,
    /// 按占位符顺序排列的参数
    pub parameters: Vec<DataValue>,
}

impl BoundSql {
    pub fn new<S: Into<String>>(sql: S, parameters: Vec<DataValue>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }
}

/// 执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// 查询返回的行
    Rows(Vec<DataValue>),
    /// 变更影响的行数
    Affected(u64),
    /// 执行失败
    Failed,
}
