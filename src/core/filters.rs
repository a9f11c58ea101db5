use crate::models::{Filter, MatchPolicy, Profile};

/// Filter value that accepts any profile value
pub const WILDCARD: &str = "all";

#[inline]
fn field_accepts(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        None | Some(WILDCARD) => true,
        Some(value) => actual == Some(value),
    }
}

/// Check if a single filter accepts a profile
///
/// Every non-wildcard field of the filter has to equal the profile's field.
/// A profile lacking the field never satisfies a concrete constraint.
#[inline]
pub fn matches_filter(profile: &Profile, filter: &Filter) -> bool {
    field_accepts(filter.gender.as_deref(), profile.gender.as_deref())
        && field_accepts(filter.country.as_deref(), profile.country.as_deref())
}

/// Absent filter accepts everything
#[inline]
pub fn accepts(filter: Option<&Filter>, profile: &Profile) -> bool {
    filter.map_or(true, |filter| matches_filter(profile, filter))
}

/// Check whether a waiting candidate is eligible for a requester under `policy`
#[inline]
pub fn is_compatible(
    policy: MatchPolicy,
    requester_profile: &Profile,
    requester_filter: Option<&Filter>,
    candidate_profile: &Profile,
    candidate_filter: Option<&Filter>,
) -> bool {
    if !accepts(requester_filter, candidate_profile) {
        return false;
    }

    match policy {
        MatchPolicy::Mutual => accepts(candidate_filter, requester_profile),
        MatchPolicy::RequesterOnly => true,
    }
}
