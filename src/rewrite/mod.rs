//! 条件变更的主键反查
//!
//! 把 `UPDATE ... WHERE` / `DELETE ... WHERE` 改写为按相同条件查询主键列的 SELECT，
//! 再交给关系型数据访问层执行，得到受影响行的主键

use crate::error::AutoCacheResult;
use crate::i18n::tf;
use crate::types::BoundSql;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rat_logger::debug;
use regex::Regex;
use std::sync::Arc;

/// SQL 条件改写器
pub trait PredicateRewriter: Send + Sync {
    /// 改写为 `SELECT <主键列> FROM <表> WHERE <原条件>`，只保留条件部分的绑定参数
    fn rewrite_as_select_id_column(&self, bound_sql: &BoundSql, id_column: &str) -> AutoCacheResult<BoundSql>;
}

/// 主键查询执行器，由关系型数据访问层实现
#[async_trait]
pub trait IdentifierQuery: Send + Sync {
    /// 执行只返回主键列的查询，租户显式传入
    async fn select_identifiers(&self, bound_sql: &BoundSql, tenant_id: Option<&str>) -> AutoCacheResult<Vec<String>>;
}

static UPDATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*update\s+(.+?)\s+set\s+(.+?)(?:\s+where\s+(.+?))?\s*;?\s*$")
        .expect("UPDATE 改写正则非法")
});

static DELETE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*delete\s+from\s+(.+?)(?:\s+where\s+(.+?))?\s*;?\s*$")
        .expect("DELETE 改写正则非法")
});

/// 基于正则的简单改写器
///
/// 覆盖单表的 `UPDATE t SET ... [WHERE ...]` 与 `DELETE FROM t [WHERE ...]`，
/// 不支持多表关联与子查询中的 SET
#[derive(Debug, Default, Clone)]
pub struct SimpleSqlRewriter;

impl SimpleSqlRewriter {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(sql: &str) -> crate::error::AutoCacheError {
        crate::autocache_error!(rewrite, tf("error.rewrite_unsupported", &[("sql", sql)]))
    }
}

/// 统计单引号字符串之外的 `?` 占位符
fn count_placeholders(sql: &str) -> usize {
    let mut in_literal = false;
    let mut count = 0;
    for c in sql.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}

impl PredicateRewriter for SimpleSqlRewriter {
    fn rewrite_as_select_id_column(&self, bound_sql: &BoundSql, id_column: &str) -> AutoCacheResult<BoundSql> {
        let sql = bound_sql.sql.as_str();

        let (table, skipped, predicate) = if let Some(caps) = UPDATE_PATTERN.captures(sql) {
            let set_clause = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            (
                caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
                count_placeholders(set_clause),
                caps.get(3).map(|m| m.as_str()),
            )
        } else if let Some(caps) = DELETE_PATTERN.captures(sql) {
            (
                caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
                0,
                caps.get(2).map(|m| m.as_str()),
            )
        } else {
            return Err(Self::unsupported(sql));
        };

        if table.trim().is_empty() || table.contains(',') {
            return Err(Self::unsupported(sql));
        }

        let expected = skipped + predicate.map(count_placeholders).unwrap_or(0);
        if bound_sql.parameters.len() < expected {
            return Err(crate::autocache_error!(
                rewrite,
                tf(
                    "error.rewrite_parameters",
                    &[
                        ("expected", expected.to_string().as_str()),
                        ("actual", bound_sql.parameters.len().to_string().as_str()),
                    ]
                )
            ));
        }

        let rewritten = match predicate {
            Some(predicate) => format!("SELECT {} FROM {} WHERE {}", id_column, table.trim(), predicate),
            None => format!("SELECT {} FROM {}", id_column, table.trim()),
        };
        let parameters = bound_sql.parameters[skipped..expected].to_vec();
        debug!("改写条件变更SQL: {} -> {}", sql, rewritten);
        Ok(BoundSql::new(rewritten, parameters))
    }
}

/// 条件变更的主键解析：改写 + 执行
#[derive(Clone)]
pub struct PredicateResolver {
    rewriter: Arc<dyn PredicateRewriter>,
    identifiers: Arc<dyn IdentifierQuery>,
}

impl PredicateResolver {
    pub fn new(rewriter: Arc<dyn PredicateRewriter>, identifiers: Arc<dyn IdentifierQuery>) -> Self {
        Self { rewriter, identifiers }
    }

    /// 使用默认的正则改写器
    pub fn with_simple_rewriter(identifiers: Arc<dyn IdentifierQuery>) -> Self {
        Self::new(Arc::new(SimpleSqlRewriter::new()), identifiers)
    }

    /// 求出条件变更影响的主键
    pub async fn resolve_ids(
        &self,
        bound_sql: &BoundSql,
        id_column: &str,
        tenant_id: Option<&str>,
    ) -> AutoCacheResult<Vec<String>> {
        let select = self.rewriter.rewrite_as_select_id_column(bound_sql, id_column)?;
        self.identifiers.select_identifiers(&select, tenant_id).await
    }
}

impl std::fmt::Debug for PredicateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateResolver")
            .field("rewriter", &"<PredicateRewriter>")
            .field("identifiers", &"<IdentifierQuery>")
            .finish()
    }
}
