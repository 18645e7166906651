use chrono::{DateTime, Duration, Utc};

/// Start of the next fetch. The source returns everything after this point, so there is no
/// end bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
	pub start: DateTime<Utc>,
	/// `false` when the device had no cursor and the default lookback was used.
	pub from_cursor: bool,
}

impl SyncWindow {
	/// A lookback reaching past the earliest representable time starts there instead.
	#[must_use]
	pub fn resolve(cursor: Option<DateTime<Utc>>, now: DateTime<Utc>, lookback: Duration) -> Self {
		cursor.map_or_else(
			|| Self {
				start: now
					.checked_sub_signed(lookback)
					.unwrap_or(DateTime::<Utc>::MIN_UTC),
				from_cursor: false,
			},
			|start| Self {
				start,
				from_cursor: true,
			},
		)
	}
}
