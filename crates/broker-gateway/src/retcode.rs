//! Central retcode classification.
//!
//! Every `order_send` response funnels through here so that fill-mode
//! detection and retry decisions live in exactly one place instead of
//! string checks scattered across the codebase.

use crate::types::OrderStatus;

/// Request completed
pub const RETCODE_DONE: i32 = 10009;
/// Invalid or unsupported fill mode
pub const RETCODE_INVALID_FILL: i32 = 10030;
/// Requote
pub const RETCODE_REQUOTE: i32 = 10004;
/// Request rejected
pub const RETCODE_REJECT: i32 = 10006;

/// Map a raw broker response to an `OrderStatus`.
///
/// `retcode == None` means the terminal returned nothing (null/timeout);
/// that is always transient, never a rejection.
pub fn classify(retcode: Option<i32>, comment: &str) -> OrderStatus {
    let lower = comment.to_ascii_lowercase();
    match retcode {
        None => OrderStatus::TransientError,
        Some(RETCODE_DONE) => OrderStatus::Filled,
        Some(RETCODE_INVALID_FILL) => OrderStatus::FillModeError,
        Some(_) if lower.contains("filling") || lower.contains("unsupported") => {
            OrderStatus::FillModeError
        }
        Some(_) => OrderStatus::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_is_filled() {
        assert_eq!(classify(Some(RETCODE_DONE), ""), OrderStatus::Filled);
    }

    #[test]
    fn retcode_10030_is_fill_mode_error() {
        assert_eq!(
            classify(Some(RETCODE_INVALID_FILL), "Unsupported filling mode"),
            OrderStatus::FillModeError
        );
    }

    #[test]
    fn filling_comment_is_fill_mode_error_regardless_of_retcode() {
        assert_eq!(
            classify(Some(RETCODE_REJECT), "invalid filling type"),
            OrderStatus::FillModeError
        );
        assert_eq!(
            classify(Some(RETCODE_REJECT), "order type unsupported"),
            OrderStatus::FillModeError
        );
    }

    #[test]
    fn null_response_is_transient_never_rejected() {
        assert_eq!(classify(None, ""), OrderStatus::TransientError);
    }

    #[test]
    fn other_retcodes_are_terminal_rejections() {
        assert_eq!(classify(Some(RETCODE_REQUOTE), "requote"), OrderStatus::Rejected);
        assert_eq!(classify(Some(RETCODE_REJECT), "rejected"), OrderStatus::Rejected);
    }
}
