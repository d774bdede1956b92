//! 集成测试共用的内存关系型存储与测试装配

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rat_autocache::*;
use rat_autocache::autocache_error;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub type Row = HashMap<String, DataValue>;

/// 内存中的关系型存储，统计真实调用次数
#[derive(Clone, Default)]
pub struct FakeDb {
    state: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    /// 表名 -> (主键文本 -> 行)
    tables: Mutex<HashMap<String, BTreeMap<String, Row>>>,
    /// Mapper -> 表名
    mappers: Mutex<HashMap<String, String>>,
    query_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    identifier_calls: AtomicUsize,
    identifier_tenants: Mutex<Vec<Option<String>>>,
    query_delay_ms: AtomicU64,
    fail_identifiers: AtomicBool,
}

pub fn row<I: Into<DataValue>>(id: I, name: &str, mobile: &str, status: i64) -> Row {
    let mut row = HashMap::new();
    row.insert("id".to_string(), id.into());
    row.insert("name".to_string(), DataValue::from(name));
    row.insert("mobile".to_string(), DataValue::from(mobile));
    row.insert("status".to_string(), DataValue::Int(status));
    row
}

impl FakeDb {
    pub fn new() -> Self {
        let db = Self::default();
        db.map_table("UserMapper", "users");
        db.map_table("OrderMapper", "orders");
        db
    }

    pub fn map_table(&self, mapper: &str, table: &str) {
        self.state
            .mappers
            .lock()
            .insert(mapper.to_string(), table.to_string());
        self.state.tables.lock().entry(table.to_string()).or_default();
    }

    pub fn insert_row(&self, table: &str, row: Row) {
        let id = match row.get("id") {
            Some(id) if !id.is_null() => id.to_string(),
            _ => panic!("测试数据缺少主键"),
        };
        self.state
            .tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    pub fn set_field(&self, table: &str, id: i64, field: &str, value: DataValue) {
        if let Some(row) = self
            .state
            .tables
            .lock()
            .get_mut(table)
            .and_then(|rows| rows.get_mut(&id.to_string()))
        {
            row.insert(field.to_string(), value);
        }
    }

    pub fn query_calls(&self) -> usize {
        self.state.query_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.state.execute_calls.load(Ordering::SeqCst)
    }

    pub fn identifier_calls(&self) -> usize {
        self.state.identifier_calls.load(Ordering::SeqCst)
    }

    pub fn identifier_tenants(&self) -> Vec<Option<String>> {
        self.state.identifier_tenants.lock().clone()
    }

    pub fn set_query_delay(&self, delay_ms: u64) {
        self.state.query_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn fail_identifiers(&self, fail: bool) {
        self.state.fail_identifiers.store(fail, Ordering::SeqCst);
    }

    fn table_of(&self, invocation: &Invocation) -> String {
        let mapper = invocation.mapper().unwrap_or_default();
        self.state
            .mappers
            .lock()
            .get(mapper)
            .cloned()
            .unwrap_or_else(|| panic!("未映射的 Mapper: {}", mapper))
    }

    fn first_param(parameter: &CallParameter, name: &str) -> Option<DataValue> {
        match parameter {
            CallParameter::Scalar(value) => Some(value.clone()),
            CallParameter::Positional(values) => values.first().cloned(),
            CallParameter::Named(fields) | CallParameter::Entity(fields) => fields.get(name).cloned(),
            _ => None,
        }
    }

    fn rows_matching(&self, table: &str, conditions: &[(String, DataValue)]) -> Vec<Row> {
        self.state
            .tables
            .lock()
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| conditions.iter().all(|(col, value)| row.get(col) == Some(value)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 方法名中的字段转为列名：`findByMobile` -> `mobile`，`countByUserId` -> `user_id`
fn field_after(method: &str, prefix: &str) -> Option<String> {
    let rest = method.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    let mut column = String::new();
    for (idx, c) in rest.chars().enumerate() {
        if c.is_uppercase() {
            if idx > 0 {
                column.push('_');
            }
            column.extend(c.to_lowercase());
        } else {
            column.push(c);
        }
    }
    Some(column)
}

/// 解析 `a = ? AND b = ?` 形式的条件列
fn condition_columns(clause: &str) -> Vec<String> {
    clause
        .split(" AND ")
        .flat_map(|part| part.split(','))
        .filter_map(|part| part.split('=').next())
        .map(|col| col.trim().to_string())
        .filter(|col| !col.is_empty())
        .collect()
}

/// 拆分 SQL 为 (表名, SET 列, WHERE 列)
fn parse_statement(sql: &str) -> (String, Vec<String>, Vec<String>) {
    let (head, where_cols) = match sql.find(" WHERE ") {
        Some(idx) => (&sql[..idx], condition_columns(&sql[idx + " WHERE ".len()..])),
        None => (sql, Vec::new()),
    };
    if let Some(rest) = head.strip_prefix("UPDATE ") {
        let (table, set_clause) = rest.split_once(" SET ").unwrap_or((rest, ""));
        return (table.trim().to_string(), condition_columns(set_clause), where_cols);
    }
    if let Some(table) = head.strip_prefix("DELETE FROM ") {
        return (table.trim().to_string(), Vec::new(), where_cols);
    }
    if let Some(rest) = head.strip_prefix("SELECT ") {
        let (_, table) = rest.split_once(" FROM ").unwrap_or(("", rest));
        return (table.trim().to_string(), Vec::new(), where_cols);
    }
    panic!("测试存储不支持的SQL: {}", sql)
}

fn zip_values(columns: &[String], values: &[DataValue]) -> Vec<(String, DataValue)> {
    columns.iter().cloned().zip(values.iter().cloned()).collect()
}

#[async_trait]
impl DataAccess for FakeDb {
    async fn query(&self, invocation: &Invocation) -> AutoCacheResult<Vec<DataValue>> {
        self.state.query_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let table = self.table_of(invocation);
        let method = invocation.method().unwrap_or_default();
        if method == "selectByPrimaryKey" {
            let id = Self::first_param(&invocation.parameter, "id").unwrap_or(DataValue::Null);
            let rows = self.rows_matching(&table, &[("id".to_string(), id)]);
            return Ok(rows.into_iter().map(DataValue::Object).collect());
        }
        if let Some(field) = field_after(method, "findBy") {
            let value = Self::first_param(&invocation.parameter, &field).unwrap_or(DataValue::Null);
            let rows = self.rows_matching(&table, &[(field, value)]);
            return Ok(rows.into_iter().map(DataValue::Object).collect());
        }
        if let Some(field) = field_after(method, "countBy") {
            let value = Self::first_param(&invocation.parameter, &field).unwrap_or(DataValue::Null);
            let count = self.rows_matching(&table, &[(field, value)]).len();
            return Ok(vec![DataValue::Int(count as i64)]);
        }
        if method == "findAll" {
            let rows = self.rows_matching(&table, &[]);
            return Ok(rows.into_iter().map(DataValue::Object).collect());
        }
        Err(autocache_error!(query, format!("测试存储不支持的查询: {}", method)))
    }

    async fn execute(&self, invocation: &Invocation) -> AutoCacheResult<u64> {
        self.state.execute_calls.fetch_add(1, Ordering::SeqCst);
        let table = self.table_of(invocation);
        let method = invocation.method().unwrap_or_default();
        let mut tables = self.state.tables.lock();
        let rows = tables.entry(table.clone()).or_default();

        match (method, &invocation.parameter) {
            ("insert", CallParameter::Entity(fields)) => {
                let Some(id) = fields.get("id").filter(|id| !id.is_null()) else {
                    return Err(autocache_error!(query, "插入缺少主键"));
                };
                rows.insert(id.to_string(), fields.clone());
                Ok(1)
            }
            ("updateByPrimaryKey", CallParameter::Entity(fields)) => {
                let Some(id) = fields.get("id") else {
                    return Ok(0);
                };
                match rows.get_mut(&id.to_string()) {
                    Some(row) => {
                        row.extend(fields.clone());
                        Ok(1)
                    }
                    None => Ok(0),
                }
            }
            ("deleteByPrimaryKey", CallParameter::Scalar(id)) => {
                Ok(rows.remove(&id.to_string()).map(|_| 1).unwrap_or(0))
            }
            _ => {
                let Some(bound) = &invocation.bound_sql else {
                    return Err(autocache_error!(query, format!("测试存储不支持的变更: {}", method)));
                };
                let (_, set_cols, where_cols) = parse_statement(&bound.sql);
                let assignments = zip_values(&set_cols, &bound.parameters);
                let conditions = zip_values(&where_cols, &bound.parameters[set_cols.len()..]);
                let matched: Vec<String> = rows
                    .iter()
                    .filter(|(_, row)| conditions.iter().all(|(col, value)| row.get(col) == Some(value)))
                    .map(|(id, _)| id.clone())
                    .collect();
                let is_delete = bound.sql.starts_with("DELETE");
                for id in &matched {
                    if is_delete {
                        rows.remove(id);
                    } else if let Some(row) = rows.get_mut(id) {
                        for (col, value) in &assignments {
                            row.insert(col.clone(), value.clone());
                        }
                    }
                }
                Ok(matched.len() as u64)
            }
        }
    }
}

#[async_trait]
impl IdentifierQuery for FakeDb {
    async fn select_identifiers(&self, bound_sql: &BoundSql, tenant_id: Option<&str>) -> AutoCacheResult<Vec<String>> {
        self.state.identifier_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .identifier_tenants
            .lock()
            .push(tenant_id.map(|t| t.to_string()));
        if self.state.fail_identifiers.load(Ordering::SeqCst) {
            return Err(autocache_error!(query, "主键反查失败"));
        }

        let (table, _, where_cols) = parse_statement(&bound_sql.sql);
        let conditions = zip_values(&where_cols, &bound_sql.parameters);
        Ok(self
            .rows_matching(&table, &conditions)
            .iter()
            .filter_map(|row| row.get("id").map(|id| id.to_string()))
            .collect())
    }
}

/// 测试用的用户与订单实体描述
pub fn user_schema() -> EntitySchema {
    EntitySchema::new("User", "UserMapper", "users")
        .fields(&["name", "mobile", "status"])
        .query(
            QueryDeclaration::new("findByMobile", &["mobile"], ReturnShape::Entity)
                .options(CacheOptions::new().unique_index()),
        )
        .query(QueryDeclaration::new("findByStatus", &["status"], ReturnShape::EntityList))
        .query(QueryDeclaration::new("countByStatus", &["status"], ReturnShape::Value))
        .query(
            QueryDeclaration::new("findById", &["uid"], ReturnShape::Entity)
                .options(CacheOptions::new().ref_key("uid")),
        )
        .query(
            QueryDeclaration::new("findByName", &["name"], ReturnShape::EntityList)
                .options(CacheOptions::new().user_scope()),
        )
        .mutation("updateByStatus", SqlCommandType::Update)
        .mutation("deleteByStatus", SqlCommandType::Delete)
}

pub fn order_schema() -> EntitySchema {
    EntitySchema::new("Order", "OrderMapper", "orders")
        .fields(&["user_id"])
        .query(
            QueryDeclaration::new("countByUserId", &["user_id"], ReturnShape::Value)
                .options(CacheOptions::new().evict_on(&["UserMapper.deleteByPrimaryKey"])),
        )
}

/// 装配好的测试环境
pub struct Harness {
    pub db: FakeDb,
    pub store: Arc<MemoryCacheStore>,
    pub handler: Arc<AutoCacheHandler>,
    pub executor: CachedExecutor,
}

impl Harness {
    pub fn new(config: AutoCacheConfig) -> Self {
        let db = FakeDb::new();
        db.insert_row("users", row(1, "alice", "13800000001", 0));
        db.insert_row("users", row(2, "bob", "13800000002", 0));
        db.insert_row("users", row(3, "carol", "13800000003", 1));

        let store = Arc::new(MemoryCacheStore::new());
        let handler = Arc::new(
            AutoCacheHandler::builder(config)
                .store(store.clone())
                .entity(user_schema())
                .entity(order_schema())
                .identifier_query(Arc::new(db.clone()))
                .build()
                .expect("构建自动缓存处理器失败"),
        );
        let pipeline = Arc::new(InterceptorPipeline::new().register(handler.clone()));
        let executor = CachedExecutor::new(Box::new(db.clone()), pipeline);
        Self {
            db,
            store,
            handler,
            executor,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AutoCacheConfig::default())
    }

    pub async fn select(&self, operation_id: &str, parameter: CallParameter) -> Vec<DataValue> {
        self.select_in(operation_id, parameter, CallContext::default()).await
    }

    pub async fn select_in(&self, operation_id: &str, parameter: CallParameter, context: CallContext) -> Vec<DataValue> {
        self.executor
            .select(Invocation::select(operation_id, parameter).with_context(context))
            .await
            .expect("查询失败")
    }

    pub async fn mutate(&self, invocation: Invocation) -> u64 {
        let affected = self.executor.mutate(invocation).await.expect("变更失败");
        self.handler.wait_idle().await;
        affected
    }

    pub async fn cached(&self, key: &str) -> Option<String> {
        self.store.get(key).await.expect("读取缓存失败")
    }
}

/// 用户实体参数
pub fn user_entity(id: i64, name: &str) -> CallParameter {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), DataValue::Int(id));
    fields.insert("name".to_string(), DataValue::from(name));
    CallParameter::Entity(fields)
}

pub fn name_of(value: &DataValue) -> Option<String> {
    match value.get_field("name") {
        Some(DataValue::String(name)) => Some(name.clone()),
        _ => None,
    }
}
