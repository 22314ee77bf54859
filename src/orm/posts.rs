//! SeaORM Entity for posts table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Moderation state of a post. Deletion removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Sensitive word hit or unsafe classifier verdict.
    #[sea_orm(string_value = "flagged")]
    Flagged,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "hidden")]
    Hidden,
}

impl PostStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "flagged" => Some(Self::Flagged),
            "approved" => Some(Self::Approved),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Flagged => "flagged",
            Self::Approved => "approved",
            Self::Hidden => "hidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Category {
    #[sea_orm(string_value = "general")]
    #[default]
    General,
    #[sea_orm(string_value = "study")]
    Study,
    #[sea_orm(string_value = "emotion")]
    Emotion,
    #[sea_orm(string_value = "career")]
    Career,
    #[sea_orm(string_value = "life")]
    Life,
    #[sea_orm(string_value = "other")]
    Other,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(Self::General),
            "study" => Some(Self::Study),
            "emotion" => Some(Self::Emotion),
            "career" => Some(Self::Career),
            "life" => Some(Self::Life),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// None for anonymous submissions.
    pub user_id: Option<i32>,
    pub category: Category,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub tag: Option<String>,
    /// Comma-separated matched words, recorded at creation.
    pub sensitive_hits: Option<String>,
    pub review_note: Option<String>,
    pub status: PostStatus,
    pub report_count: i32,
    pub created_at: DateTime,
    pub approved_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Author,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
