//! # 请求日志实体定义
//!
//! 网关遥测记录：每个完成分类的请求写入一行

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 请求日志实体
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub service: String,
    pub model: String,
    pub status_code: i32,
    pub latency_ms: i64,
    /// HIT / MISS / N/A
    pub cache_status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 判断请求是否成功（2xx）
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}
