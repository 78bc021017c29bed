use serde::Serialize;
use uuid::Uuid;

use crate::entities::Gender;

/// Profile fields set during profile setup
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(rename = "avatar_character", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Upsert row: the update plus the owning user id
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProfileRow<'a> {
    pub id: Uuid,
    #[serde(flatten)]
    pub update: &'a ProfileUpdate,
}
