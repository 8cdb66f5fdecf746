/// Interview sessions
///
/// A session is one mock interview owned by a user, optionally run under a
/// tenant and optionally grounded in one of the user's resumes. Creating a
/// session costs credits; the debit and the insert share a transaction in
/// [`InterviewSession::create_paid`].
///
/// # Lifecycle
///
/// ```text
/// scheduled ──start──▶ in_progress ──complete──▶ completed
///     │                    │
///     └──cancel──▶ cancelled ◀──cancel──┘
///                          │
///                          └── (idle, swept by the worker) ──▶ abandoned
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::credit_transaction::{CreditError, CreditKind, CreditTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    Technical,
    Behavioral,
    SystemDesign,
    Hr,
    Mixed,
}

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewType::Technical => "technical",
            InterviewType::Behavioral => "behavioral",
            InterviewType::SystemDesign => "system_design",
            InterviewType::Hr => "hr",
            InterviewType::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "technical" => Some(InterviewType::Technical),
            "behavioral" => Some(InterviewType::Behavioral),
            "system_design" => Some(InterviewType::SystemDesign),
            "hr" => Some(InterviewType::Hr),
            "mixed" => Some(InterviewType::Mixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(SessionStatus::Scheduled),
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Abandoned
        )
    }

    /// States a session may move to from `self`
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (InProgress, Abandoned)
        )
    }

    /// States from which `next` is reachable
    pub fn sources_of(next: SessionStatus) -> Vec<SessionStatus> {
        use SessionStatus::*;
        [Scheduled, InProgress, Completed, Cancelled, Abandoned]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InterviewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub resume_id: Option<Uuid>,
    pub title: String,
    pub job_role: String,
    pub interview_type: String,
    pub difficulty: String,
    pub status: String,
    pub credits_used: i32,

    /// Final score 0..=100, set on completion
    pub score: Option<i32>,
    pub feedback: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A session after a status change, with the status it left
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transition {
    #[sqlx(flatten)]
    pub session: InterviewSession,
    pub previous_status: String,
}

impl Transition {
    pub fn previous(&self) -> Option<SessionStatus> {
        SessionStatus::parse(&self.previous_status)
    }
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub resume_id: Option<Uuid>,
    pub title: String,
    pub job_role: String,
    pub interview_type: InterviewType,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
}

/// Aggregates for the admin dashboard
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct SessionStats {
    pub total: i64,
    pub scheduled: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub abandoned: i64,
    pub average_score: Option<f64>,
}

impl InterviewSession {
    pub fn get_status(&self) -> Option<SessionStatus> {
        SessionStatus::parse(&self.status)
    }

    pub fn get_type(&self) -> InterviewType {
        InterviewType::parse(&self.interview_type).unwrap_or(InterviewType::Mixed)
    }

    pub fn get_difficulty(&self) -> Difficulty {
        Difficulty::parse(&self.difficulty).unwrap_or(Difficulty::Medium)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Debits `cost` credits and inserts the session atomically
    ///
    /// Returns the session and the user's remaining balance.
    ///
    /// # Errors
    ///
    /// `CreditError::Insufficient` if the balance is below `cost`; nothing is
    /// written in that case.
    pub async fn create_paid(
        pool: &PgPool,
        data: CreateSession,
        cost: i32,
    ) -> Result<(Self, i32), CreditError> {
        let session_id = Uuid::new_v4();
        let mut tx = pool.begin().await?;

        let balance = if cost > 0 {
            let debit = CreditTransaction::apply(
                &mut tx,
                data.user_id,
                -cost,
                CreditKind::SessionDebit,
                Some(&session_id.to_string()),
                Some(&format!("Interview session: {}", data.title)),
            )
            .await?;
            debit.balance_after
        } else {
            sqlx::query_scalar::<_, i32>("SELECT credits FROM users WHERE id = $1")
                .bind(data.user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(CreditError::UserNotFound(data.user_id))?
        };

        let session = sqlx::query_as::<_, InterviewSession>(
            r#"
            INSERT INTO sessions (id, user_id, tenant_id, resume_id, title, job_role,
                                  interview_type, difficulty, credits_used)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(data.user_id)
        .bind(data.tenant_id)
        .bind(data.resume_id)
        .bind(&data.title)
        .bind(&data.job_role)
        .bind(data.interview_type.as_str())
        .bind(data.difficulty.as_str())
        .bind(cost)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((session, balance))
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, InterviewSession>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Fetches a session only if `user_id` owns it
    pub async fn find_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, InterviewSession>("SELECT * FROM sessions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, InterviewSession>(
            r#"
            SELECT * FROM sessions
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::UUID IS NULL OR tenant_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, filter: &SessionFilter) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::UUID IS NULL OR tenant_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(pool)
        .await
    }

    /// Moves a session to `next` if its current state allows it
    ///
    /// Sets `started_at` on the first move to `in_progress` and `ended_at`
    /// on any terminal state. The row is locked before the update, so the
    /// returned `previous_status` is the state the update actually left.
    /// Returns `None` when the session does not exist or is not in a state
    /// that can reach `next`.
    pub async fn transition(pool: &PgPool, id: Uuid, next: SessionStatus) -> Result<Option<Transition>, sqlx::Error> {
        let sources: Vec<&'static str> = SessionStatus::sources_of(next).iter().map(|s| s.as_str()).collect();

        sqlx::query_as::<_, Transition>(
            r#"
            WITH prior AS (
                SELECT id, status FROM sessions
                WHERE id = $1 AND status = ANY($4)
                FOR UPDATE
            )
            UPDATE sessions s
            SET status = $2,
                started_at = CASE WHEN $2 = 'in_progress' THEN COALESCE(s.started_at, NOW()) ELSE s.started_at END,
                ended_at = CASE WHEN $3 THEN NOW() ELSE s.ended_at END,
                last_activity_at = NOW(),
                updated_at = NOW()
            FROM prior
            WHERE s.id = prior.id
            RETURNING s.*, prior.status AS previous_status
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(next.is_terminal())
        .bind(&sources)
        .fetch_optional(pool)
        .await
    }

    /// Completes an in-progress session with its evaluation
    pub async fn complete(
        pool: &PgPool,
        id: Uuid,
        score: i32,
        feedback: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, InterviewSession>(
            r#"
            UPDATE sessions
            SET status = 'completed', score = $2, feedback = $3,
                ended_at = NOW(), last_activity_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(score.clamp(0, 100))
        .bind(feedback)
        .fetch_optional(pool)
        .await
    }

    pub async fn touch<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET last_activity_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Marks in-progress sessions idle for longer than `idle_for` as abandoned
    pub async fn abandon_stale(pool: &PgPool, idle_for: Duration) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, InterviewSession>(
            r#"
            UPDATE sessions
            SET status = 'abandoned', ended_at = NOW(), updated_at = NOW()
            WHERE status = 'in_progress' AND last_activity_at < $1
            RETURNING *
            "#,
        )
        .bind(Utc::now() - idle_for)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_tenant_since(
        pool: &PgPool,
        tenant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE tenant_id = $1 AND created_at >= $2")
            .bind(tenant_id)
            .bind(since)
            .fetch_one(pool)
            .await
    }

    pub async fn stats(pool: &PgPool) -> Result<SessionStats, sqlx::Error> {
        sqlx::query_as::<_, SessionStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'scheduled') AS scheduled,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                COUNT(*) FILTER (WHERE status = 'abandoned') AS abandoned,
                AVG(score)::FLOAT8 AS average_score
            FROM sessions
            "#,
        )
        .fetch_one(pool)
        .await
    }
}
