use crate::application::{AccountError, AnalysisError, HistoryError, PaymentError};
use crate::domain::ImageError;
use axum::http::StatusCode;
use validator::ValidationErrors;

pub(super) fn map_analysis_error(err: &AnalysisError) -> (StatusCode, serde_json::Value) {
    match err {
        AnalysisError::InvalidImage(ImageError::Missing) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Screenshot is required" }),
        ),
        AnalysisError::InvalidImage(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Invalid image format. Must be a base64 encoded image." }),
        ),
        AnalysisError::QuotaExhausted => (
            StatusCode::FORBIDDEN,
            serde_json::json!({
                "error": "No free trials left. Upgrade your plan or wait for the daily reset.",
                "freeTrialsLeft": 0
            }),
        ),
        AnalysisError::ScreenshotNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Screenshot not found" }),
        ),
        AnalysisError::Overloaded => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "error": "The AI service is overloaded right now. Please try again in a moment."
            }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to process image" }),
        ),
    }
}

pub(super) fn map_history_error(err: &HistoryError, fallback: &str) -> (StatusCode, serde_json::Value) {
    match err {
        HistoryError::ScreenshotNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Screenshot not found" }),
        ),
        HistoryError::QuestionNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Question not found" }),
        ),
        HistoryError::InvalidInput(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        HistoryError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": fallback }),
        ),
    }
}

pub(super) fn map_payment_error(err: &PaymentError) -> (StatusCode, serde_json::Value) {
    match err {
        PaymentError::MissingOrderId => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Order ID is required" }),
        ),
        PaymentError::AlreadyPremium => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "You already have a premium subscription" }),
        ),
        PaymentError::OrderNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Order not found" }),
        ),
        PaymentError::MissingSessionId => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Payment gateway did not return a session ID" }),
        ),
        PaymentError::InvalidWebhook(msg) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Invalid webhook payload", "details": msg }),
        ),
        PaymentError::InvalidSignature => (
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": "Invalid webhook signature" }),
        ),
        PaymentError::Gateway(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Payment gateway request failed" }),
        ),
        PaymentError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Payment processing failed" }),
        ),
    }
}

pub(super) fn map_account_error(err: &AccountError) -> (StatusCode, serde_json::Value) {
    match err {
        AccountError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Internal Server Error" }),
        ),
    }
}

pub(super) fn map_body_error(err: &serde_json::Error) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "error": "Invalid request body", "details": err.to_string() }),
    )
}

/// First validation message, so clients see the same text the services return.
pub(super) fn map_validation_errors(errors: &ValidationErrors) -> (StatusCode, serde_json::Value) {
    let message = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid request".to_string());

    (StatusCode::BAD_REQUEST, serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{GatewayError, RepositoryError, VisionError};
    use uuid::Uuid;

    #[test]
    fn analysis_errors_map_to_contract_statuses() {
        let (status, body) = map_analysis_error(&AnalysisError::InvalidImage(ImageError::Missing));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Screenshot is required");

        let (status, _) = map_analysis_error(&AnalysisError::InvalidImage(ImageError::InvalidBase64));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = map_analysis_error(&AnalysisError::QuotaExhausted);
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = map_analysis_error(&AnalysisError::Overloaded);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = map_analysis_error(&AnalysisError::Vision(VisionError::Api {
            status: 400,
            message: "secret upstream detail".to_string(),
        }));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("secret upstream detail"));
    }

    #[test]
    fn foreign_and_missing_resources_are_not_found() {
        let (status, _) = map_history_error(&HistoryError::ScreenshotNotFound(Uuid::nil()), "x");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = map_history_error(
            &HistoryError::Repository(RepositoryError::InvalidData("bad".to_string())),
            "Failed to fetch screenshots",
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch screenshots");
    }

    #[test]
    fn malformed_body_is_bad_request_envelope() {
        let err = serde_json::from_slice::<serde_json::Value>(b"{oops").unwrap_err();
        let (status, body) = map_body_error(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request body");
    }

    #[test]
    fn payment_errors_map_to_contract_statuses() {
        assert_eq!(map_payment_error(&PaymentError::AlreadyPremium).0, StatusCode::BAD_REQUEST);
        assert_eq!(map_payment_error(&PaymentError::MissingOrderId).0, StatusCode::BAD_REQUEST);
        assert_eq!(map_payment_error(&PaymentError::InvalidSignature).0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            map_payment_error(&PaymentError::MissingSessionId).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            map_payment_error(&PaymentError::Gateway(GatewayError::RequestFailed("x".to_string()))).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
