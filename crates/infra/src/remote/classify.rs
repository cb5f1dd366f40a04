//! Maps transport failures, HTTP statuses and GraphQL errors onto the
//! failure taxonomy.

use reqwest::StatusCode;
use stagesync_domain::{FailureKind, MutationError};

/// Transport-level failure: the request never produced a readable response.
pub fn classify_transport(err: &reqwest::Error) -> MutationError {
    if err.is_timeout() {
        MutationError::Timeout(err.to_string())
    } else if err.is_connect() {
        MutationError::Network(format!("connection failed: {err}"))
    } else if err.is_decode() || err.is_body() {
        MutationError::Network(format!("unreadable response body: {err}"))
    } else {
        MutationError::Network(err.to_string())
    }
}

/// Non-success HTTP status of a whole request.
pub fn classify_status(status: StatusCode, detail: &str) -> MutationError {
    let message = if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    };

    match status.as_u16() {
        401 => MutationError::Authentication(message),
        403 => MutationError::Authorization(message),
        404 => MutationError::NotFound(message),
        408 | 504 => MutationError::Timeout(message),
        429 => MutationError::RateLimit(message),
        500..=599 => MutationError::TemporaryServer(message),
        400..=499 => MutationError::Validation(message),
        _ => MutationError::Network(message),
    }
}

/// Markers per failure kind, checked in order against a lowercased code or
/// message.
const GRAPHQL_RULES: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::RateLimit,
        &["complexity", "rate_limit", "ratelimit", "rate limit", "daily_limit", "too many"],
    ),
    (FailureKind::Authorization, &["unauthorized", "forbidden", "permission", "not allowed"]),
    (
        FailureKind::Authentication,
        &["authenticat", "invalid token", "invalid_token", "token expired", "missing token"],
    ),
    (
        FailureKind::NotFound,
        &["not found", "not_found", "notfound", "invalid id", "invalidboardid", "invaliditemid"],
    ),
    (FailureKind::Timeout, &["timeout", "timed out"]),
    (
        FailureKind::TemporaryServer,
        &["internal_server", "internal server", "internal error", "server error", "unavailable"],
    ),
];

fn graphql_kind(text: &str) -> Option<FailureKind> {
    let text = text.to_ascii_lowercase();
    GRAPHQL_RULES
        .iter()
        .find(|(_, markers)| markers.iter().any(|marker| text.contains(marker)))
        .map(|(kind, _)| *kind)
}

/// GraphQL error, by `extensions.code` when the error carries one and by
/// message otherwise. Unrecognised errors are treated as validation failures
/// of the data sent.
pub fn classify_graphql(code: Option<&str>, message: &str) -> MutationError {
    let kind = match code.map(str::trim).filter(|code| !code.is_empty()) {
        Some(code) => graphql_kind(code),
        None => graphql_kind(message),
    };
    MutationError::new(kind.unwrap_or(FailureKind::Validation), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let cases = [
            (401, FailureKind::Authentication),
            (403, FailureKind::Authorization),
            (404, FailureKind::NotFound),
            (408, FailureKind::Timeout),
            (504, FailureKind::Timeout),
            (429, FailureKind::RateLimit),
            (500, FailureKind::TemporaryServer),
            (503, FailureKind::TemporaryServer),
            (400, FailureKind::Validation),
            (422, FailureKind::Validation),
        ];
        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status, "").kind(), kind, "HTTP {code}");
        }
    }

    #[test]
    fn graphql_codes_and_messages_are_classified() {
        let cases = [
            (Some("ComplexityException"), "Complexity budget exhausted", FailureKind::RateLimit),
            (None, "Rate limit exceeded", FailureKind::RateLimit),
            (Some("USER_UNAUTHORIZED"), "User unauthorized to perform action", FailureKind::Authorization),
            (None, "Not Authenticated", FailureKind::Authentication),
            (None, "Invalid token", FailureKind::Authentication),
            (Some("InvalidBoardIdException"), "Board does not exist", FailureKind::NotFound),
            (Some("ResourceNotFoundException"), "Item not found", FailureKind::NotFound),
            (Some("INTERNAL_SERVER_ERROR"), "Something went wrong", FailureKind::TemporaryServer),
            (None, "Query timed out", FailureKind::Timeout),
            (Some("ColumnValueException"), "invalid value for column qty", FailureKind::Validation),
            (None, "something nobody anticipated", FailureKind::Validation),
        ];
        for (code, message, kind) in cases {
            assert_eq!(classify_graphql(code, message).kind(), kind, "{code:?} / {message}");
        }
    }

    #[test]
    fn column_names_in_messages_do_not_override_the_code() {
        let cases = [
            (Some("ColumnValueException"), "invalid value for column token_count"),
            (Some("ColumnValueException"), "internal_ref is read-only"),
            (Some("  "), "column token_count is invalid"),
            (None, "internal_ref must be a number"),
        ];
        for (code, message) in cases {
            assert_eq!(
                classify_graphql(code, message).kind(),
                FailureKind::Validation,
                "{code:?} / {message}"
            );
        }
    }

    #[test]
    fn code_wins_over_message() {
        let err = classify_graphql(Some("ComplexityException"), "Item not found");
        assert_eq!(err.kind(), FailureKind::RateLimit);
        assert_eq!(err.message(), "Item not found");
    }

    #[test]
    fn status_detail_is_kept() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "retry in 30s");
        assert_eq!(err.message(), "HTTP 429 Too Many Requests: retry in 30s");
    }
}
