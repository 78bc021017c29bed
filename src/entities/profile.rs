use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Player profile, one per authenticated user. `id` is the auth user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default, rename = "avatar_character")]
    pub avatar: Option<String>,
}

impl Profile {
    /// A profile counts as set up once it has a username.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    PreferNotToSay,
}

impl Gender {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            "prefer_not_to_say" => Some(Self::PreferNotToSay),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::PreferNotToSay => "prefer_not_to_say",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selectable avatar characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Avatar {
    pub id: &'static str,
    pub label: &'static str,
}

pub const AVATARS: &[Avatar] = &[
    Avatar { id: "char1", label: "Warrior" },
    Avatar { id: "char2", label: "Mage" },
    Avatar { id: "char3", label: "Rogue" },
    Avatar { id: "char4", label: "Knight" },
];

pub const DEFAULT_AVATAR: &str = "char1";

impl Avatar {
    #[must_use]
    pub fn find(id: &str) -> Option<Self> {
        AVATARS.iter().copied().find(|a| a.id == id)
    }
}
