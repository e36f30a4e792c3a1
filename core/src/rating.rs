//! Rating Aggregator.
//!
//! A book's rating is stored as a running mean plus the number of ratings
//! that contributed to it. Individual ratings are never persisted; each
//! submission folds into the aggregate:
//!
//! ```text
//! average' = (average * count + rating) / (count + 1)
//! count'   = count + 1
//! ```
//!
//! No rounding is applied here. Everything in this module is pure.

use crate::error::EngagementError;
use serde::{Deserialize, Serialize};

/// Lowest accepted rating.
pub const MIN_RATING: u8 = 1;

/// Highest accepted rating.
pub const MAX_RATING: u8 = 5;

const RANGE_MESSAGE: &str = "Rating must be 1-5";

/// A single validated rating in `1..=5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    /// Validate an integer rating.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Validation`] when `value` is outside `1..=5`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bookshelf_core::rating::Rating;
    ///
    /// assert_eq!(Rating::new(5).unwrap().value(), 5);
    /// assert!(Rating::new(0).is_err());
    /// assert!(Rating::new(6).is_err());
    /// ```
    pub fn new(value: i64) -> Result<Self, EngagementError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (MIN_RATING..=MAX_RATING).contains(v))
            .map(Self)
            .ok_or_else(|| EngagementError::validation(RANGE_MESSAGE))
    }

    /// Coerce a raw JSON value into a rating.
    ///
    /// Accepts integral numbers and numeric strings (`4`, `4.0`, `"4"`).
    /// Fractional values, booleans, null, and anything non-numeric are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Validation`] when the value is not coercible
    /// to an integer in `1..=5`.
    pub fn coerce(raw: &serde_json::Value) -> Result<Self, EngagementError> {
        let number = match raw {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| EngagementError::validation(RANGE_MESSAGE))?;

        if !number.is_finite() || number.fract() != 0.0 {
            return Err(EngagementError::validation(RANGE_MESSAGE));
        }
        if number < f64::from(MIN_RATING) || number > f64::from(MAX_RATING) {
            return Err(EngagementError::validation(RANGE_MESSAGE));
        }

        #[allow(clippy::cast_possible_truncation)] // Range checked above
        Self::new(number as i64)
    }

    /// The rating as an integer.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Running mean of all ratings submitted for a book, and their count.
///
/// Invariant: `average_rating` is the mean of exactly `rating_count` ratings,
/// so it lies in `1.0..=5.0` whenever `rating_count > 0` and is `0.0` otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAggregate {
    /// Arithmetic mean of every rating so far
    pub average_rating: f64,
    /// Number of ratings folded into the mean
    pub rating_count: u64,
}

impl RatingAggregate {
    /// Create an aggregate from stored values.
    #[must_use]
    pub const fn new(average_rating: f64, rating_count: u64) -> Self {
        Self {
            average_rating,
            rating_count,
        }
    }

    /// Fold one more rating into the aggregate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Counts stay far below 2^53
    pub fn record(self, rating: Rating) -> Self {
        let count = self.rating_count as f64;
        let average_rating =
            self.average_rating.mul_add(count, f64::from(rating.value())) / (count + 1.0);

        Self {
            average_rating,
            rating_count: self.rating_count + 1,
        }
    }

    /// Check the aggregate invariant for externally supplied values.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Validation`] when the average is not finite,
    /// lies outside `0..=5`, or is non-zero with a zero count.
    pub fn validate(&self) -> Result<(), EngagementError> {
        let average = self.average_rating;
        if !average.is_finite() || !(0.0..=f64::from(MAX_RATING)).contains(&average) {
            return Err(EngagementError::validation(
                "Average rating must be between 0 and 5",
            ));
        }
        if self.rating_count == 0 && average != 0.0 {
            return Err(EngagementError::validation(
                "Average rating must be 0 when there are no ratings",
            ));
        }
        Ok(())
    }
}

/// Compute the new `(average, count)` pair from the current pair and a raw rating.
///
/// # Errors
///
/// Returns [`EngagementError::Validation`] when `new_rating` is outside `1..=5`.
///
/// # Examples
///
/// ```
/// use bookshelf_core::rating::aggregate;
///
/// let first = aggregate(0.0, 0, 4).unwrap();
/// assert_eq!((first.average_rating, first.rating_count), (4.0, 1));
///
/// let second = aggregate(first.average_rating, first.rating_count, 2).unwrap();
/// assert_eq!((second.average_rating, second.rating_count), (3.0, 2));
/// ```
pub fn aggregate(
    average_rating: f64,
    rating_count: u64,
    new_rating: i64,
) -> Result<RatingAggregate, EngagementError> {
    let rating = Rating::new(new_rating)?;
    Ok(RatingAggregate::new(average_rating, rating_count).record(rating))
}
