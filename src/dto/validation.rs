//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dto::room::QuestionInput;

/// Longest room code accepted from clients.
pub const MAX_ROOM_CODE_LENGTH: usize = 16;
/// Longest countdown a question may request.
pub const MAX_TIME_LIMIT_SECS: u64 = 3_600;

/// Validates that a room code is 1 to 16 ASCII letters, digits, `-` or `_`.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("ABCD")     // Ok
/// validate_room_code("quiz-42")  // Ok
/// validate_room_code("")         // Err - empty
/// validate_room_code("AB CD")    // Err - space
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LENGTH {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be 1 to {MAX_ROOM_CODE_LENGTH} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters, digits, `-` or `_`".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a question definition: non-empty text, at least two options, a correct
/// index inside the options and a sane time limit.
pub fn validate_question(position: usize, question: &QuestionInput) -> Result<(), ValidationError> {
    let fail = |code: &'static str, message: String| {
        let mut err = ValidationError::new(code);
        err.message = Some(format!("question {position}: {message}").into());
        Err(err)
    };

    if question.text.trim().is_empty() {
        return fail("question_text", "text must not be empty".into());
    }

    if question.options.len() < 2 {
        return fail(
            "question_options",
            format!("needs at least 2 options (got {})", question.options.len()),
        );
    }

    if question.correct_index >= question.options.len() {
        return fail(
            "question_correct_index",
            format!(
                "correct index {} is outside the {} options",
                question.correct_index,
                question.options.len()
            ),
        );
    }

    if let Some(secs) = question.time_limit_seconds {
        if secs == 0 || secs > MAX_TIME_LIMIT_SECS {
            return fail(
                "question_time_limit",
                format!("time limit must be between 1 and {MAX_TIME_LIMIT_SECS} seconds"),
            );
        }
    }

    Ok(())
}
