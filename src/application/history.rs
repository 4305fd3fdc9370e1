use crate::domain::{hash_image_reference, Question, Screenshot};
use crate::infrastructure::{QuestionRepository, RepositoryError, ScreenshotRepository};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Screenshot not found: {0}")]
    ScreenshotNotFound(Uuid),
    #[error("Question not found: {0}")]
    QuestionNotFound(Uuid),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Screenshot and question history for a single owner. Anything owned by
/// someone else is reported as not found.
pub struct HistoryService<S, Q>
where
    S: ScreenshotRepository,
    Q: QuestionRepository,
{
    screenshot_repo: Arc<S>,
    question_repo: Arc<Q>,
}

impl<S, Q> HistoryService<S, Q>
where
    S: ScreenshotRepository,
    Q: QuestionRepository,
{
    pub fn new(screenshot_repo: Arc<S>, question_repo: Arc<Q>) -> Self {
        Self {
            screenshot_repo,
            question_repo,
        }
    }

    pub async fn list_screenshots(&self, user_id: Uuid) -> Result<Vec<Screenshot>, HistoryError> {
        Ok(self.screenshot_repo.list_by_user(user_id).await?)
    }

    /// Stores a screenshot reference. Returns the existing record and `false`
    /// when the caller already saved the same image.
    pub async fn save_screenshot(
        &self,
        user_id: Uuid,
        image_url: String,
    ) -> Result<(Screenshot, bool), HistoryError> {
        if image_url.trim().is_empty() {
            return Err(HistoryError::InvalidInput("Image URL is required".to_string()));
        }

        let hash = hash_image_reference(&image_url);
        if let Some(existing) = self.screenshot_repo.find_by_owner_and_hash(user_id, &hash).await? {
            return Ok((existing, false));
        }

        let screenshot = Screenshot::new(user_id, image_url);
        self.screenshot_repo.create(&screenshot).await?;
        info!(user_id = %user_id, screenshot_id = %screenshot.id, "Screenshot saved");

        Ok((screenshot, true))
    }

    pub async fn screenshot_with_questions(
        &self,
        user_id: Uuid,
        screenshot_id: Uuid,
    ) -> Result<(Screenshot, Vec<Question>), HistoryError> {
        let screenshot = self.owned_screenshot(user_id, screenshot_id).await?;
        let questions = self
            .question_repo
            .list_by_user(user_id, Some(screenshot_id))
            .await?;

        Ok((screenshot, questions))
    }

    pub async fn delete_screenshot(&self, user_id: Uuid, screenshot_id: Uuid) -> Result<(), HistoryError> {
        self.owned_screenshot(user_id, screenshot_id).await?;

        let removed = self.question_repo.delete_by_screenshot(screenshot_id).await?;
        self.screenshot_repo.delete(screenshot_id).await?;

        info!(
            user_id = %user_id,
            screenshot_id = %screenshot_id,
            questions_removed = removed,
            "Screenshot deleted"
        );
        Ok(())
    }

    pub async fn list_questions(
        &self,
        user_id: Uuid,
        screenshot_id: Option<Uuid>,
    ) -> Result<Vec<Question>, HistoryError> {
        Ok(self.question_repo.list_by_user(user_id, screenshot_id).await?)
    }

    /// Records a question without an answer, e.g. one typed before analysis.
    pub async fn add_question(
        &self,
        user_id: Uuid,
        screenshot_id: Uuid,
        question: String,
    ) -> Result<Question, HistoryError> {
        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(HistoryError::InvalidInput("Question is required".to_string()));
        }
        self.owned_screenshot(user_id, screenshot_id).await?;

        let record = Question::new(user_id, screenshot_id, question, None);
        self.question_repo.create(&record).await?;
        Ok(record)
    }

    pub async fn delete_question(&self, user_id: Uuid, question_id: Uuid) -> Result<(), HistoryError> {
        let question = match self.question_repo.get_by_id(question_id).await {
            Ok(q) if q.user_id == user_id => q,
            Ok(_) | Err(RepositoryError::NotFound(_)) => {
                return Err(HistoryError::QuestionNotFound(question_id))
            }
            Err(e) => return Err(e.into()),
        };

        self.question_repo.delete(question.id).await?;
        Ok(())
    }

    async fn owned_screenshot(&self, user_id: Uuid, id: Uuid) -> Result<Screenshot, HistoryError> {
        match self.screenshot_repo.get_by_id(id).await {
            Ok(s) if s.is_owned_by(user_id) => Ok(s),
            Ok(_) | Err(RepositoryError::NotFound(_)) => Err(HistoryError::ScreenshotNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}
