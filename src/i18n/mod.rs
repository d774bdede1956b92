//! 多语言错误消息模块
//!
//! 使用rat_embed_lang框架提供统一的错误消息多语言支持

use rat_embed_lang::register_translations;
use std::collections::HashMap;

/// 错误消息翻译注册器
pub struct ErrorMessageI18n;

impl ErrorMessageI18n {
    fn entry(
        translations: &mut HashMap<String, HashMap<String, String>>,
        key: &str,
        zh: &str,
        en: &str,
        ja: &str,
    ) {
        let mut messages = HashMap::new();
        messages.insert("zh-CN".to_string(), zh.to_string());
        messages.insert("en-US".to_string(), en.to_string());
        messages.insert("ja-JP".to_string(), ja.to_string());
        translations.insert(key.to_string(), messages);
    }

    /// 注册所有错误消息翻译
    pub fn register_all_translations() {
        let mut translations = HashMap::new();

        // 配置错误
        Self::entry(
            &mut translations,
            "error.config_value",
            "配置项 {field} 非法: {message}",
            "Invalid configuration value {field}: {message}",
            "設定項目 {field} が不正です: {message}",
        );

        // 元数据注册错误
        Self::entry(
            &mut translations,
            "error.unique_index_return",
            "方法 {method} 声明了 uniqueIndex，但返回类型不是 {entity}",
            "Method {method} declares uniqueIndex but does not return {entity}",
            "メソッド {method} は uniqueIndex を宣言していますが {entity} を返しません",
        );
        Self::entry(
            &mut translations,
            "error.duplicate_operation",
            "操作 {operation} 重复注册",
            "Operation {operation} is registered twice",
            "操作 {operation} が重複して登録されています",
        );
        Self::entry(
            &mut translations,
            "error.entity_id_missing",
            "实体 {entity} 未声明主键字段",
            "Entity {entity} does not declare an id field",
            "エンティティ {entity} は主キーフィールドを宣言していません",
        );
        Self::entry(
            &mut translations,
            "error.duplicate_mapper",
            "Mapper {mapper} 重复注册",
            "Mapper {mapper} is registered twice",
            "Mapper {mapper} が重複して登録されています",
        );

        // SQL 改写错误
        Self::entry(
            &mut translations,
            "error.rewrite_unsupported",
            "不支持改写的语句: {sql}",
            "Statement cannot be rewritten: {sql}",
            "書き換えできないステートメント: {sql}",
        );
        Self::entry(
            &mut translations,
            "error.rewrite_parameters",
            "绑定参数数量不足: 需要 {expected}，实际 {actual}",
            "Not enough bound parameters: expected {expected}, got {actual}",
            "バインドパラメータが不足しています: 必要 {expected}、実際 {actual}",
        );

        // 后台任务错误
        Self::entry(
            &mut translations,
            "error.worker_closed",
            "失效任务队列已关闭",
            "Invalidation task queue is closed",
            "無効化タスクキューは閉じられています",
        );

        // 注册所有翻译
        register_translations(translations);
    }

    /// 初始化错误消息多语言支持
    pub fn init() {
        Self::register_all_translations();

        // 从环境变量获取语言设置，默认为zh-CN
        let lang = std::env::var("RAT_LANG")
            .or_else(|_| std::env::var("LANG"))
            .unwrap_or_else(|_| "zh-CN".to_string());

        // 标准化语言代码
        use rat_embed_lang::normalize_language_code;
        let normalized_lang = normalize_language_code(&lang);
        set_language(&normalized_lang);
    }
}

/// 重新导出rat_embed_lang的核心函数
pub use rat_embed_lang::{current_language, set_language, t, tf};
