//! Read-only repository for the `accounts` table.
//!
//! Account CRUD belongs to the admin collaborator; the broker only ever
//! fetches accounts to select one and to report quota standing.

use atelier_core::types::DbId;

use crate::models::account::Account;
use crate::DbPool;

/// Column list for `accounts` queries.
const COLUMNS: &str = "\
    id, name, video_endpoint_id, image_endpoint_id, api_key, \
    edit_base_url, edit_api_key, edit_model, is_active, \
    created_at, updated_at";

pub struct AccountRepo;

impl AccountRepo {
    /// Find an account by its ID, active or not.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Account>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE id = ?");
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All active accounts, ordered by ID for deterministic selection.
    pub async fn list_active(pool: &DbPool) -> Result<Vec<Account>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE is_active = 1 ORDER BY id");
        sqlx::query_as::<_, Account>(&query).fetch_all(pool).await
    }
}
