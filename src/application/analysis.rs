use crate::domain::{hash_image_reference, ImageError, Question, Screenshot, ScreenshotImage, User};
use crate::infrastructure::{
    QuestionRepository, RepositoryError, ScreenshotRepository, UserRepository, VisionError,
    VisionModel,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_QUESTION: &str = "What do you see in this screenshot? Please describe it in detail.";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error("No credits left")]
    QuotaExhausted,
    #[error("Screenshot not found: {0}")]
    ScreenshotNotFound(Uuid),
    #[error("Vision model overloaded")]
    Overloaded,
    #[error("Vision model error: {0}")]
    Vision(VisionError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct AnalyzeInput {
    pub screenshot: String,
    pub question: Option<String>,
    pub screenshot_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub answer: String,
    pub screenshot_id: Uuid,
    pub question_id: Uuid,
    pub free_trials_left: i32,
}

pub struct AnalysisService<U, S, Q>
where
    U: UserRepository,
    S: ScreenshotRepository,
    Q: QuestionRepository,
{
    user_repo: Arc<U>,
    screenshot_repo: Arc<S>,
    question_repo: Arc<Q>,
    vision: Arc<dyn VisionModel>,
}

impl<U, S, Q> AnalysisService<U, S, Q>
where
    U: UserRepository,
    S: ScreenshotRepository,
    Q: QuestionRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        screenshot_repo: Arc<S>,
        question_repo: Arc<Q>,
        vision: Arc<dyn VisionModel>,
    ) -> Self {
        Self {
            user_repo,
            screenshot_repo,
            question_repo,
            vision,
        }
    }

    /// Answers a question about a screenshot, spending one credit.
    ///
    /// The credit is taken before the model call and handed back if the call
    /// fails, so concurrent requests can never spend more than the balance.
    pub async fn analyze(&self, user: &User, input: AnalyzeInput) -> Result<AnalysisOutcome, AnalysisError> {
        let image = ScreenshotImage::parse(&input.screenshot)?;

        if !user.has_credits() {
            return Err(AnalysisError::QuotaExhausted);
        }

        let existing = match input.screenshot_id {
            Some(id) => Some(self.owned_screenshot(user.id, id).await?),
            None => None,
        };

        let question = input
            .question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_QUESTION)
            .to_string();

        let free_trials_left = self
            .user_repo
            .reserve_credit(user.id)
            .await?
            .ok_or(AnalysisError::QuotaExhausted)?;

        let answer = match self.vision.ask(&image, &question).await {
            Ok(answer) => answer,
            Err(e) => {
                if let Err(refund_err) = self.user_repo.refund_credit(user.id).await {
                    warn!(user_id = %user.id, error = %refund_err, "Failed to refund credit");
                }
                return Err(match e {
                    VisionError::Overloaded(_) => AnalysisError::Overloaded,
                    other => AnalysisError::Vision(other),
                });
            }
        };

        let screenshot = match existing {
            Some(screenshot) => screenshot,
            None => self.find_or_create_screenshot(user.id, input.screenshot).await?,
        };

        let record = Question::new(user.id, screenshot.id, question, Some(answer.clone()));
        self.question_repo.create(&record).await?;

        info!(
            user_id = %user.id,
            screenshot_id = %screenshot.id,
            question_id = %record.id,
            credits_left = free_trials_left,
            "Screenshot analyzed"
        );

        Ok(AnalysisOutcome {
            answer,
            screenshot_id: screenshot.id,
            question_id: record.id,
            free_trials_left,
        })
    }

    async fn owned_screenshot(&self, user_id: Uuid, id: Uuid) -> Result<Screenshot, AnalysisError> {
        match self.screenshot_repo.get_by_id(id).await {
            Ok(s) if s.is_owned_by(user_id) => Ok(s),
            Ok(_) | Err(RepositoryError::NotFound(_)) => Err(AnalysisError::ScreenshotNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_or_create_screenshot(
        &self,
        user_id: Uuid,
        image_url: String,
    ) -> Result<Screenshot, AnalysisError> {
        let hash = hash_image_reference(&image_url);
        if let Some(found) = self.screenshot_repo.find_by_owner_and_hash(user_id, &hash).await? {
            return Ok(found);
        }

        let screenshot = Screenshot::new(user_id, image_url);
        self.screenshot_repo.create(&screenshot).await?;
        Ok(screenshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CreditPolicy;
    use crate::infrastructure::{
        MockQuestionRepository, MockScreenshotRepository, MockUserRepository, MockVisionModel,
    };

    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn user_with_credits(credits: i32) -> User {
        let mut user = User::new(
            "ada@example.com".to_string(),
            None,
            None,
            &CreditPolicy::default(),
            chrono::Utc::now(),
        );
        user.free_trials_left = credits;
        user
    }

    fn input(question: Option<&str>, screenshot_id: Option<Uuid>) -> AnalyzeInput {
        AnalyzeInput {
            screenshot: PNG.to_string(),
            question: question.map(str::to_string),
            screenshot_id,
        }
    }

    fn service(
        users: MockUserRepository,
        screenshots: MockScreenshotRepository,
        questions: MockQuestionRepository,
        vision: MockVisionModel,
    ) -> AnalysisService<MockUserRepository, MockScreenshotRepository, MockQuestionRepository> {
        AnalysisService::new(
            Arc::new(users),
            Arc::new(screenshots),
            Arc::new(questions),
            Arc::new(vision),
        )
    }

    #[tokio::test]
    async fn exhausted_credits_skip_the_model() {
        let mut users = MockUserRepository::new();
        users.expect_reserve_credit().never();
        let mut vision = MockVisionModel::new();
        vision.expect_ask().never();

        let svc = service(
            users,
            MockScreenshotRepository::new(),
            MockQuestionRepository::new(),
            vision,
        );
        let result = svc.analyze(&user_with_credits(0), input(Some("hi"), None)).await;

        assert!(matches!(result, Err(AnalysisError::QuotaExhausted)));
    }

    #[tokio::test]
    async fn invalid_image_is_rejected_before_anything_else() {
        let svc = service(
            MockUserRepository::new(),
            MockScreenshotRepository::new(),
            MockQuestionRepository::new(),
            MockVisionModel::new(),
        );
        let mut bad = input(None, None);
        bad.screenshot = "aGVsbG8gd29ybGQ=".to_string();

        let result = svc.analyze(&user_with_credits(5), bad).await;
        assert!(matches!(
            result,
            Err(AnalysisError::InvalidImage(ImageError::UnrecognizedFormat))
        ));
    }

    #[tokio::test]
    async fn absent_screenshot_is_reported_as_missing() {
        let svc = service(
            MockUserRepository::new(),
            MockScreenshotRepository::new(),
            MockQuestionRepository::new(),
            MockVisionModel::new(),
        );
        let mut absent = input(Some("hi"), None);
        absent.screenshot = String::new();

        let result = svc.analyze(&user_with_credits(5), absent).await;
        assert!(matches!(result, Err(AnalysisError::InvalidImage(ImageError::Missing))));
    }

    #[tokio::test]
    async fn success_stores_screenshot_and_answered_question() {
        let user = user_with_credits(5);

        let mut users = MockUserRepository::new();
        users.expect_reserve_credit().times(1).returning(|_| Ok(Some(4)));
        users.expect_refund_credit().never();

        let mut screenshots = MockScreenshotRepository::new();
        screenshots
            .expect_find_by_owner_and_hash()
            .times(1)
            .returning(|_, _| Ok(None));
        screenshots.expect_create().times(1).returning(|_| Ok(()));

        let mut questions = MockQuestionRepository::new();
        questions
            .expect_create()
            .withf(|q| q.answer.as_deref() == Some("A login form") && q.question == DEFAULT_QUESTION)
            .times(1)
            .returning(|_| Ok(()));

        let mut vision = MockVisionModel::new();
        vision
            .expect_ask()
            .times(1)
            .returning(|_, _| Ok("A login form".to_string()));

        let svc = service(users, screenshots, questions, vision);
        let outcome = svc.analyze(&user, input(Some("   "), None)).await.unwrap();

        assert_eq!(outcome.answer, "A login form");
        assert_eq!(outcome.free_trials_left, 4);
    }

    #[tokio::test]
    async fn overloaded_model_refunds_the_credit() {
        let mut users = MockUserRepository::new();
        users.expect_reserve_credit().returning(|_| Ok(Some(2)));
        users.expect_refund_credit().times(1).returning(|_| Ok(()));

        let mut questions = MockQuestionRepository::new();
        questions.expect_create().never();

        let mut vision = MockVisionModel::new();
        vision
            .expect_ask()
            .returning(|_, _| Err(VisionError::Overloaded(3)));

        let svc = service(users, MockScreenshotRepository::new(), questions, vision);
        let result = svc.analyze(&user_with_credits(3), input(Some("q"), None)).await;

        assert!(matches!(result, Err(AnalysisError::Overloaded)));
    }

    #[tokio::test]
    async fn foreign_screenshot_id_is_not_found() {
        let stranger = Uuid::new_v4();
        let shot = Screenshot::new(stranger, PNG.to_string());
        let shot_id = shot.id;

        let mut screenshots = MockScreenshotRepository::new();
        screenshots
            .expect_get_by_id()
            .returning(move |_| Ok(shot.clone()));

        let mut users = MockUserRepository::new();
        users.expect_reserve_credit().never();

        let svc = service(users, screenshots, MockQuestionRepository::new(), MockVisionModel::new());
        let result = svc
            .analyze(&user_with_credits(5), input(Some("q"), Some(shot_id)))
            .await;

        assert!(matches!(result, Err(AnalysisError::ScreenshotNotFound(id)) if id == shot_id));
    }

    #[tokio::test]
    async fn race_lost_at_reservation_reports_quota_exhausted() {
        let mut users = MockUserRepository::new();
        users.expect_reserve_credit().returning(|_| Ok(None));
        let mut vision = MockVisionModel::new();
        vision.expect_ask().never();

        let svc = service(
            users,
            MockScreenshotRepository::new(),
            MockQuestionRepository::new(),
            vision,
        );
        let result = svc.analyze(&user_with_credits(1), input(None, None)).await;

        assert!(matches!(result, Err(AnalysisError::QuotaExhausted)));
    }
}
