//! Families: the fixed groups that share check-in visibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::check_in::CheckInSession;
use crate::models::user::MemberResponse;
use crate::types::{FamilyId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Family {
    pub id: FamilyId,
    pub name: String,
    /// Member identities. Order carries no meaning; entries are unique.
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Family {
    pub fn new(name: String, creator: UserId) -> Self {
        Self {
            id: FamilyId::new(),
            name,
            members: vec![creator],
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Family name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyResponse {
    pub id: FamilyId,
    pub name: String,
    pub members: Vec<MemberResponse>,
    pub current_session: Option<CheckInSession>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLinkResponse {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPreviewResponse {
    pub family_id: FamilyId,
    pub family_name: String,
}
