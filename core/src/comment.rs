//! Comment Ledger.
//!
//! Comments are appended to the end of a book's thread and never edited,
//! re-sorted or deduplicated. The author's display name is a snapshot taken
//! at post time.

use crate::book::Book;
use crate::caller::UserId;
use crate::error::EngagementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single remark attached to a book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Author reference (does not imply ownership of the comment)
    pub user_id: UserId,
    /// Display name captured when the comment was posted
    pub username: String,
    /// Comment body, trimmed
    pub text: String,
    /// Server-assigned creation time
    pub created_at: DateTime<Utc>,
}

/// Validate raw comment text and return it trimmed.
///
/// # Errors
///
/// Returns [`EngagementError::Validation`] when the text is blank.
pub fn validate_text(raw_text: &str) -> Result<&str, EngagementError> {
    let text = raw_text.trim();
    if text.is_empty() {
        Err(EngagementError::validation("Comment text required"))
    } else {
        Ok(text)
    }
}

/// Append a comment to the end of a book's thread.
///
/// The timestamp is `now`, raised to the previous comment's timestamp if the
/// clock moved backwards, so timestamps never decrease along the thread.
/// On error the book is left untouched.
///
/// # Errors
///
/// Returns [`EngagementError::Validation`] when the text is blank.
pub fn append(
    book: &mut Book,
    author: &UserId,
    display_name: &str,
    raw_text: &str,
    now: DateTime<Utc>,
) -> Result<Comment, EngagementError> {
    let text = validate_text(raw_text)?;

    let created_at = book
        .comments
        .last()
        .map_or(now, |last| now.max(last.created_at));

    let comment = Comment {
        user_id: author.clone(),
        username: display_name.to_string(),
        text: text.to_string(),
        created_at,
    };

    book.comments.push(comment.clone());
    Ok(comment)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::book::NewBook;
    use chrono::Duration;
    use proptest::prelude::*;

    fn book() -> Book {
        Book::create(NewBook::titled("The Silent Library")).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600 + seconds, 0).unwrap()
    }

    #[test]
    fn append_trims_and_records_author() {
        let mut book = book();
        let comment = append(&mut book, &UserId::new("u1"), "alice", "  Great read!  ", at(0)).unwrap();

        assert_eq!(comment.text, "Great read!");
        assert_eq!(comment.username, "alice");
        assert_eq!(comment.user_id, UserId::new("u1"));
        assert_eq!(comment.created_at, at(0));
        assert_eq!(book.comments, vec![comment]);
    }

    #[test]
    fn blank_text_leaves_book_unchanged() {
        let mut book = book();
        append(&mut book, &UserId::new("u1"), "alice", "first", at(0)).unwrap();
        let before = book.clone();

        for blank in ["", "   ", "\n\t "] {
            let err = append(&mut book, &UserId::new("u2"), "bob", blank, at(1)).unwrap_err();
            assert_eq!(err, EngagementError::validation("Comment text required"));
        }
        assert_eq!(book, before);
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut book = book();
        append(&mut book, &UserId::new("u1"), "alice", "first", at(10)).unwrap();
        let second = append(&mut book, &UserId::new("u2"), "bob", "second", at(5)).unwrap();

        assert_eq!(second.created_at, at(10));
        assert!(book.comments[0].created_at <= book.comments[1].created_at);
    }

    proptest! {
        #[test]
        fn append_only_preserves_prior_comments(texts in prop::collection::vec("[a-z]{1,12}", 1..30)) {
            let mut book = book();
            for (i, text) in texts.iter().enumerate() {
                let before = book.comments.clone();
                let offset = Duration::seconds(i64::try_from(i).unwrap());
                let comment = append(&mut book, &UserId::new("u"), "user", text, at(0) + offset).unwrap();

                prop_assert_eq!(book.comments.len(), before.len() + 1);
                prop_assert_eq!(&book.comments[..before.len()], &before[..]);
                prop_assert_eq!(book.comments.last(), Some(&comment));
            }
        }
    }
}
