use crate::domain::{Order, OrderStatus, Question, Screenshot, Tier, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn update_trials(
        &self,
        id: Uuid,
        free_trials_left: i32,
        next_trial_reset: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Atomically takes one credit. Returns the remaining balance, or `None` when
    /// the balance was already exhausted.
    async fn reserve_credit(&self, id: Uuid) -> Result<Option<i32>, RepositoryError>;
    /// Gives back a reserved credit, never exceeding `max_credits`.
    async fn refund_credit(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// Sets the tier and refills trials to the new `max_credits`.
    async fn upgrade_tier(&self, id: Uuid, tier: Tier, max_credits: i32) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScreenshotRepository: Send + Sync {
    async fn create(&self, screenshot: &Screenshot) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Screenshot, RepositoryError>;
    async fn find_by_owner_and_hash(
        &self,
        user_id: Uuid,
        image_hash: &str,
    ) -> Result<Option<Screenshot>, RepositoryError>;
    /// Newest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Screenshot>, RepositoryError>;
    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError>;
    async fn count_by_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn create(&self, question: &Question) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Question, RepositoryError>;
    /// Newest first, optionally restricted to one screenshot.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        screenshot_id: Option<Uuid>,
    ) -> Result<Vec<Question>, RepositoryError>;
    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
    async fn delete_by_screenshot(&self, screenshot_id: Uuid) -> Result<u64, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Order>, RepositoryError>;
    /// Moves a CREATED order to PAID. Returns `false` if the order was not in CREATED,
    /// so only one caller ever observes the transition.
    async fn mark_paid(
        &self,
        id: &str,
        reference_id: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, name, image, tier, max_credits, free_trials_left, \
                            next_trial_reset, created_at, updated_at";

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, image, tier, max_credits, free_trials_left,
                               next_trial_reset, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.image)
        .bind(user.tier.to_string())
        .bind(user.max_credits)
        .bind(user.free_trials_left)
        .bind(user.next_trial_reset)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("User {}", id)),
                _ => RepositoryError::DatabaseError(e),
            })?;

        row_to_user(&row)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_trials(
        &self,
        id: Uuid,
        free_trials_left: i32,
        next_trial_reset: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE users
            SET free_trials_left = $1, next_trial_reset = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(free_trials_left)
        .bind(next_trial_reset)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reserve_credit(&self, id: Uuid) -> Result<Option<i32>, RepositoryError> {
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET free_trials_left = free_trials_left - 1, updated_at = $1
            WHERE id = $2 AND free_trials_left > 0
            RETURNING free_trials_left
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining)
    }

    async fn refund_credit(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE users
            SET free_trials_left = LEAST(free_trials_left + 1, max_credits), updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upgrade_tier(&self, id: Uuid, tier: Tier, max_credits: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET tier = $1, max_credits = $2, free_trials_left = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(tier.to_string())
        .bind(max_credits)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("User {}", id)));
        }
        Ok(())
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, RepositoryError> {
    let tier_str: String = row.try_get("tier")?;
    let tier = Tier::from_str(&tier_str)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown tier: {}", tier_str)))?;

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        image: row.try_get("image")?,
        tier,
        max_credits: row.try_get("max_credits")?,
        free_trials_left: row.try_get("free_trials_left")?,
        next_trial_reset: row.try_get("next_trial_reset")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresScreenshotRepository {
    pool: PgPool,
}

impl PostgresScreenshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScreenshotRepository for PostgresScreenshotRepository {
    async fn create(&self, screenshot: &Screenshot) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO screenshots (id, user_id, image_url, image_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(screenshot.id)
        .bind(screenshot.user_id)
        .bind(&screenshot.image_url)
        .bind(&screenshot.image_hash)
        .bind(screenshot.created_at)
        .bind(screenshot.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Screenshot, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, image_url, image_hash, created_at, updated_at
            FROM screenshots
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Screenshot {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_screenshot(&row)
    }

    async fn find_by_owner_and_hash(
        &self,
        user_id: Uuid,
        image_hash: &str,
    ) -> Result<Option<Screenshot>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, image_url, image_hash, created_at, updated_at
            FROM screenshots
            WHERE user_id = $1 AND image_hash = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(image_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_screenshot).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Screenshot>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, image_url, image_hash, created_at, updated_at
            FROM screenshots
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_screenshot).collect()
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM screenshots WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_by_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM screenshots
            WHERE user_id = $1 AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM screenshots WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn row_to_screenshot(row: &sqlx::postgres::PgRow) -> Result<Screenshot, RepositoryError> {
    Ok(Screenshot {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        image_url: row.try_get("image_url")?,
        image_hash: row.try_get("image_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresQuestionRepository {
    pool: PgPool,
}

impl PostgresQuestionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionRepository for PostgresQuestionRepository {
    async fn create(&self, question: &Question) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, user_id, screenshot_id, question, answer, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(question.id)
        .bind(question.user_id)
        .bind(question.screenshot_id)
        .bind(&question.question)
        .bind(&question.answer)
        .bind(question.created_at)
        .bind(question.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Question, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, screenshot_id, question, answer, created_at, updated_at
            FROM questions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Question {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_question(&row)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        screenshot_id: Option<Uuid>,
    ) -> Result<Vec<Question>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, screenshot_id, question, answer, created_at, updated_at
            FROM questions
            WHERE user_id = $1
              AND ($2::uuid IS NULL OR screenshot_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(screenshot_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_question).collect()
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_by_screenshot(&self, screenshot_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM questions WHERE screenshot_id = $1")
            .bind(screenshot_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_question(row: &sqlx::postgres::PgRow) -> Result<Question, RepositoryError> {
    Ok(Question {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        screenshot_id: row.try_get("screenshot_id")?,
        question: row.try_get("question")?,
        answer: row.try_get("answer")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, amount, currency, status, payment_session_id,
                                reference_id, created_at, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&order.id)
        .bind(order.user_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(order.status.to_string())
        .bind(&order.payment_session_id)
        .bind(&order.reference_id)
        .bind(order.created_at)
        .bind(order.paid_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, amount, currency, status, payment_session_id,
                   reference_id, created_at, paid_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn mark_paid(
        &self,
        id: &str,
        reference_id: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'PAID', reference_id = COALESCE($1, reference_id), paid_at = $2
            WHERE id = $3 AND status = 'CREATED'
            "#,
        )
        .bind(reference_id)
        .bind(paid_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order, RepositoryError> {
    let status_str: String = row.try_get("status")?;
    let status = OrderStatus::from_str(&status_str)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown order status: {}", status_str)))?;

    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status,
        payment_session_id: row.try_get("payment_session_id")?,
        reference_id: row.try_get("reference_id")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}
