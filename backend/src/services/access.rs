//! Membership and token validity checks gating every engine operation.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::family::Family;
use crate::types::UserId;

pub fn has_access(user_id: UserId, family: &Family) -> bool {
    family.contains(user_id)
}

/// A token with no expiry never lapses.
pub fn is_token_valid(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        None => true,
        Some(at) => at > now,
    }
}

pub fn require_member(user_id: UserId, family: &Family) -> Result<(), AppError> {
    if has_access(user_id, family) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You are not a member of this family".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn only_members_have_access() {
        let owner = UserId::new();
        let family = Family::new("Home".into(), owner);
        assert!(has_access(owner, &family));
        assert!(!has_access(UserId::new(), &family));
        assert!(matches!(
            require_member(UserId::new(), &family),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn token_validity_respects_expiry() {
        let now = Utc::now();
        assert!(is_token_valid(None, now));
        assert!(is_token_valid(Some(now + Duration::seconds(1)), now));
        assert!(!is_token_valid(Some(now), now));
        assert!(!is_token_valid(Some(now - Duration::days(1)), now));
    }
}
