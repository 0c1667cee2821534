//! Candidate selection for a matching run.

use super::model::{Location, UserRecord};
use crate::error::MatchingError;

/// Validate an optional city/state scope.
///
/// Both or neither must be given; blank strings count as absent.
pub fn location_scope(
    city: Option<&str>,
    state_code: Option<&str>,
) -> Result<Option<Location>, MatchingError> {
    let city = city.filter(|c| !c.trim().is_empty());
    let state_code = state_code.filter(|s| !s.trim().is_empty());
    match (city, state_code) {
        (Some(city), Some(state)) => Ok(Some(Location::new(city, state))),
        (None, None) => Ok(None),
        (city, state_code) => Err(MatchingError::PartialLocation {
            city: city.map(String::from),
            state_code: state_code.map(String::from),
        }),
    }
}

/// Eligible users without a group, optionally restricted to one location.
pub fn filter_candidates(users: Vec<UserRecord>, scope: Option<&Location>) -> Vec<UserRecord> {
    users
        .into_iter()
        .filter(|u| u.eligible && u.is_unmatched())
        .filter(|u| match scope {
            Some(loc) => u.location.as_ref() == Some(loc),
            None => true,
        })
        .collect()
}
