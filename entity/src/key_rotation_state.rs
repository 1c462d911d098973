//! # 密钥轮换状态实体定义
//!
//! 每个服务一行，记录下一次轮换使用的 1 基索引

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 密钥轮换状态实体
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "key_rotation_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub service: String,
    /// 最近一次轮换返回的索引，取值范围 [1, N]
    pub next_index: i64,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
