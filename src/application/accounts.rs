use crate::domain::{CreditPolicy, DailyUsage, PlanLimits, PlanUsage, Usage, UsageStat, User};
use crate::infrastructure::{
    Mailer, QuestionRepository, RepositoryError, ScreenshotRepository, SessionIdentity,
    UserRepository,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct AccountService<U, S, Q>
where
    U: UserRepository,
    S: ScreenshotRepository,
    Q: QuestionRepository,
{
    user_repo: Arc<U>,
    screenshot_repo: Arc<S>,
    question_repo: Arc<Q>,
    mailer: Arc<dyn Mailer>,
    policy: CreditPolicy,
}

impl<U, S, Q> AccountService<U, S, Q>
where
    U: UserRepository,
    S: ScreenshotRepository,
    Q: QuestionRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        screenshot_repo: Arc<S>,
        question_repo: Arc<Q>,
        mailer: Arc<dyn Mailer>,
        policy: CreditPolicy,
    ) -> Self {
        Self {
            user_repo,
            screenshot_repo,
            question_repo,
            mailer,
            policy,
        }
    }

    /// Loads the user behind a verified session, creating it on first sight, and
    /// refills trials if the reset time has passed.
    pub async fn resolve_session(&self, identity: &SessionIdentity) -> Result<User, AccountError> {
        let user = match self.user_repo.get_by_email(&identity.email).await? {
            Some(user) => user,
            None => self.provision(identity).await?,
        };

        self.apply_trial_reset(user, Utc::now()).await
    }

    async fn provision(&self, identity: &SessionIdentity) -> Result<User, AccountError> {
        let user = User::new(
            identity.email.clone(),
            identity.name.clone(),
            identity.image.clone(),
            &self.policy,
            Utc::now(),
        );

        if let Err(e) = self.user_repo.create(&user).await {
            // A concurrent first request may have created the row already.
            return match self.user_repo.get_by_email(&identity.email).await? {
                Some(existing) => Ok(existing),
                None => Err(e.into()),
            };
        }
        info!(user_id = %user.id, "Provisioned new user");

        if let Err(e) = self.mailer.send_welcome(user.name.clone(), &user.email).await {
            warn!(user_id = %user.id, error = %e, "Failed to send welcome email");
        }

        Ok(user)
    }

    pub async fn apply_trial_reset(&self, mut user: User, now: DateTime<Utc>) -> Result<User, AccountError> {
        if user.refill_if_due(self.policy.reset_period, now) {
            self.user_repo
                .update_trials(user.id, user.free_trials_left, user.next_trial_reset)
                .await?;
            info!(
                user_id = %user.id,
                credits = user.free_trials_left,
                next_reset = %user.next_trial_reset,
                "Refilled free trials"
            );
        }
        Ok(user)
    }

    pub async fn plan_usage(&self, user: &User, now: DateTime<Utc>) -> Result<PlanUsage, AccountError> {
        let limits = PlanLimits::for_tier(user.tier);
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);

        let screenshots_today = self
            .screenshot_repo
            .count_by_user_since(user.id, start_of_day)
            .await?;
        let screenshots_total = self.screenshot_repo.count_by_user(user.id).await?;
        let questions_total = self.question_repo.count_by_user(user.id).await?;
        let chats_today = i64::from((user.max_credits - user.free_trials_left).max(0));

        Ok(PlanUsage {
            current_plan: user.plan(),
            usage: Usage {
                screenshots: UsageStat {
                    daily: DailyUsage::new(screenshots_today, limits.screenshots_per_day),
                    total: screenshots_total,
                },
                ai_chats: UsageStat {
                    daily: DailyUsage::new(chats_today, limits.ai_chats_per_day),
                    total: questions_total,
                },
            },
        })
    }
}
