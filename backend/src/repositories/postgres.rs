//! Postgres-backed store. Queries are checked at runtime so the crate builds
//! without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    check_in::{CheckInSession, Coordinate, LocationSample},
    family::Family,
    password_reset::PasswordReset,
    token::{AuthToken, ExpiredTokenCounts, JoinToken},
    user::User,
};
use crate::repositories::store::{CheckInStore, RedeemOutcome};
use crate::types::{FamilyId, JoinTokenId, PasswordResetId, SessionId, UserId};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, push_address, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, family_id, host_id, location_lat, location_long, \
     destination_lat, destination_long, radius, distance, stall_count, battery_level, \
     place_name, started_at, updated_at, history";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct FamilyRow {
    id: FamilyId,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    id: SessionId,
    family_id: FamilyId,
    host_id: UserId,
    location_lat: f64,
    location_long: f64,
    destination_lat: f64,
    destination_long: f64,
    radius: f64,
    distance: f64,
    stall_count: i32,
    battery_level: f64,
    place_name: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    history: Json<Vec<LocationSample>>,
}

impl From<SessionRow> for CheckInSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            family_id: row.family_id,
            host_id: row.host_id,
            location: Coordinate::new(row.location_lat, row.location_long),
            destination: Coordinate::new(row.destination_lat, row.destination_long),
            radius: row.radius,
            distance: row.distance,
            stall_count: row.stall_count.max(0) as u32,
            battery_level: row.battery_level,
            place_name: row.place_name,
            started_at: row.started_at,
            updated_at: row.updated_at,
            history: row.history.0,
        }
    }
}

fn stall_count_column(session: &CheckInSession) -> i32 {
    i32::try_from(session.stall_count).unwrap_or(i32::MAX)
}

#[async_trait]
impl CheckInStore for PgStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, push_address, created_at, \
             updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.push_address)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match AppError::from(err) {
            AppError::Conflict(_) => {
                AppError::Conflict("Username or email already registered".to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
        let query = format!(
            "SELECT {} FROM users WHERE id = ANY($1) ORDER BY username",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn set_push_address(
        &self,
        id: UserId,
        push_address: Option<String>,
    ) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE users SET push_address = $1, updated_at = NOW() WHERE id = $2")
                .bind(push_address)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn family_ids_for_user(&self, id: UserId) -> Result<Vec<FamilyId>, AppError> {
        let ids = sqlx::query_scalar::<_, FamilyId>(
            "SELECT family_id FROM family_members WHERE user_id = $1 ORDER BY family_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn create_family(&self, family: &Family) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO families (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(family.id)
            .bind(&family.name)
            .bind(family.created_at)
            .execute(&mut *tx)
            .await?;
        for member in &family.members {
            sqlx::query("INSERT INTO family_members (family_id, user_id) VALUES ($1, $2)")
                .bind(family.id)
                .bind(*member)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_family(&self, id: FamilyId) -> Result<Option<Family>, AppError> {
        let Some(row) = sqlx::query_as::<_, FamilyRow>(
            "SELECT id, name, created_at FROM families WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let members = sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM family_members WHERE family_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Family {
            id: row.id,
            name: row.name,
            members,
            created_at: row.created_at,
        }))
    }

    async fn remove_member(&self, family_id: FamilyId, user_id: UserId) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM family_members WHERE family_id = $1 AND user_id = $2")
                .bind(family_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_session(&self, family_id: FamilyId) -> Result<Option<CheckInSession>, AppError> {
        let query = format!(
            "SELECT {} FROM check_in_sessions WHERE family_id = $1",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(family_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CheckInSession::from))
    }

    async fn insert_session(&self, session: &CheckInSession) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO check_in_sessions ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (family_id) DO NOTHING",
            SESSION_COLUMNS
        );
        let result = sqlx::query(&query)
            .bind(session.id)
            .bind(session.family_id)
            .bind(session.host_id)
            .bind(session.location.lat)
            .bind(session.location.long)
            .bind(session.destination.lat)
            .bind(session.destination.long)
            .bind(session.radius)
            .bind(session.distance)
            .bind(stall_count_column(session))
            .bind(session.battery_level)
            .bind(&session.place_name)
            .bind(session.started_at)
            .bind(session.updated_at)
            .bind(Json(&session.history))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "A check-in session is already active".to_string(),
            ));
        }
        Ok(())
    }

    async fn update_session(&self, session: &CheckInSession) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE check_in_sessions SET location_lat = $1, location_long = $2, \
             destination_lat = $3, destination_long = $4, distance = $5, \
             stall_count = $6, battery_level = $7, place_name = $8, updated_at = $9, \
             history = $10 WHERE id = $11 AND family_id = $12 AND host_id = $13",
        )
        .bind(session.location.lat)
        .bind(session.location.long)
        .bind(session.destination.lat)
        .bind(session.destination.long)
        .bind(session.distance)
        .bind(stall_count_column(session))
        .bind(session.battery_level)
        .bind(&session.place_name)
        .bind(session.updated_at)
        .bind(Json(&session.history))
        .bind(session.id)
        .bind(session.family_id)
        .bind(session.host_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(
        &self,
        family_id: FamilyId,
        session_id: SessionId,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM check_in_sessions WHERE family_id = $1 AND id = $2")
            .bind(family_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_join_token(&self, token: &JoinToken) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO join_tokens (id, family_id, token_hash, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.id)
        .bind(token.family_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_join_token(&self, token_hash: &str) -> Result<Option<JoinToken>, AppError> {
        let token = sqlx::query_as::<_, JoinToken>(
            "SELECT id, family_id, token_hash, created_at, expires_at \
             FROM join_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn delete_join_token(&self, id: JoinTokenId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM join_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn redeem_join_token(
        &self,
        id: JoinTokenId,
        user_id: UserId,
    ) -> Result<RedeemOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // The row lock makes concurrent redemptions of one token serialize here.
        let family_id = sqlx::query_scalar::<_, FamilyId>(
            "SELECT family_id FROM join_tokens WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(family_id) = family_id else {
            return Ok(RedeemOutcome::TokenGone);
        };

        let inserted = sqlx::query(
            "INSERT INTO family_members (family_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (family_id, user_id) DO NOTHING",
        )
        .bind(family_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(RedeemOutcome::AlreadyMember);
        }

        sqlx::query("DELETE FROM join_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(RedeemOutcome::Joined(family_id))
    }

    async fn insert_auth_token(&self, token: &AuthToken) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO auth_tokens (id, user_id, token_hash, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_auth_token(&self, token_hash: &str) -> Result<Option<AuthToken>, AppError> {
        let token = sqlx::query_as::<_, AuthToken>(
            "SELECT id, user_id, token_hash, created_at, expires_at \
             FROM auth_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn insert_password_reset(&self, reset: &PasswordReset) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO password_resets (id, user_id, token_hash, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(reset.id)
        .bind(reset.user_id)
        .bind(&reset.token_hash)
        .bind(reset.created_at)
        .bind(reset.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordReset>, AppError> {
        let reset = sqlx::query_as::<_, PasswordReset>(
            "SELECT id, user_id, token_hash, created_at, expires_at \
             FROM password_resets WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reset)
    }

    async fn delete_password_reset(&self, id: PasswordResetId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM password_resets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        id: PasswordResetId,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let user_id = sqlx::query_scalar::<_, UserId>(
            "DELETE FROM password_resets WHERE id = $1 RETURNING user_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(user_id) = user_id else {
            return Ok(false);
        };

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_expired_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpiredTokenCounts, AppError> {
        let mut counts = ExpiredTokenCounts::default();
        for (table, slot) in [
            ("auth_tokens", &mut counts.auth_tokens),
            ("join_tokens", &mut counts.join_tokens),
            ("password_resets", &mut counts.password_resets),
        ] {
            let query = format!(
                "DELETE FROM {} WHERE expires_at IS NOT NULL AND expires_at <= $1",
                table
            );
            let result = sqlx::query(&query).bind(now).execute(&self.pool).await?;
            *slot = result.rows_affected();
        }
        Ok(counts)
    }
}
