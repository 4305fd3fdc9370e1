use crate::application::{
    AccountService, AnalysisService, HistoryService, PaymentService, PaymentSettings,
};
use crate::infrastructure::{
    AnthropicClient, AppConfig, CashfreeClient, DisabledMailer, Mailer, PostgresOrderRepository,
    PostgresQuestionRepository, PostgresScreenshotRepository, PostgresUserRepository, ResendMailer,
    SessionKeys, WebhookVerifier,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

pub type AccountServiceType =
    AccountService<PostgresUserRepository, PostgresScreenshotRepository, PostgresQuestionRepository>;

pub type AnalysisServiceType =
    AnalysisService<PostgresUserRepository, PostgresScreenshotRepository, PostgresQuestionRepository>;

pub type HistoryServiceType = HistoryService<PostgresScreenshotRepository, PostgresQuestionRepository>;

pub type PaymentServiceType = PaymentService<PostgresUserRepository, PostgresOrderRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub sessions: Arc<SessionKeys>,
    pub body_limit: usize,
    pub accounts: Arc<AccountServiceType>,
    pub analysis: Arc<AnalysisServiceType>,
    pub history: Arc<HistoryServiceType>,
    pub payments: Arc<PaymentServiceType>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let sessions = Arc::new(SessionKeys::new(&config.auth_secret).context("init session keys")?);

    let vision = Arc::new(
        AnthropicClient::new(
            &config.anthropic_api_key,
            config.anthropic_base_url.clone(),
            config.anthropic_model.clone(),
            config.anthropic_max_tokens,
        )
        .context("init Anthropic client")?,
    );

    let gateway = Arc::new(
        CashfreeClient::new(
            &config.cashfree_app_id,
            &config.cashfree_secret_key,
            &config.cashfree_environment,
        )
        .context("init Cashfree client")?,
    );

    let mailer: Arc<dyn Mailer> = if config.resend_api_key.is_empty() {
        warn!("ASKSHOT_RESEND_API_KEY not set, welcome emails disabled");
        Arc::new(DisabledMailer)
    } else {
        Arc::new(
            ResendMailer::new(config.resend_api_key.clone(), config.email_from.clone())
                .context("init Resend mailer")?,
        )
    };

    let user_repo = Arc::new(PostgresUserRepository::new(pool.clone()));
    let screenshot_repo = Arc::new(PostgresScreenshotRepository::new(pool.clone()));
    let question_repo = Arc::new(PostgresQuestionRepository::new(pool.clone()));
    let order_repo = Arc::new(PostgresOrderRepository::new(pool.clone()));

    let accounts = Arc::new(AccountService::new(
        user_repo.clone(),
        screenshot_repo.clone(),
        question_repo.clone(),
        mailer,
        config.credit_policy(),
    ));

    let analysis = Arc::new(AnalysisService::new(
        user_repo.clone(),
        screenshot_repo.clone(),
        question_repo.clone(),
        vision,
    ));

    let history = Arc::new(HistoryService::new(screenshot_repo, question_repo));

    let payments = Arc::new(PaymentService::new(
        user_repo,
        order_repo,
        gateway,
        WebhookVerifier::new(config.cashfree_secret_key.clone()),
        PaymentSettings {
            amount: config.order_amount,
            currency: config.order_currency.clone(),
            public_base_url: config.public_base_url.clone(),
            paid_max_credits: config.paid_max_credits,
            require_signature: config.require_webhook_signature,
        },
    ));

    Ok(AppState {
        pool,
        sessions,
        body_limit: config.max_body_bytes,
        accounts,
        analysis,
        history,
        payments,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
