//! Recommended version selection and obsolescence classification
//!
//! Both work on releases sorted newest first with prereleases removed, as kept by
//! [`PackageRecord`](crate::package::PackageRecord).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::{MIN_RELEASED_DAYS, MIN_STABLE_DAYS};
use crate::version::constraint::Constraint;
use crate::version::pep440::Version;
use crate::version::types::Release;

/// Days between current and recommended release at which each level starts
const MILD_AFTER_DAYS: i64 = 270;
const MODERATE_AFTER_DAYS: i64 = 500;
const SEVERE_AFTER_DAYS: i64 = 730;

/// How far the current version has fallen behind the recommended one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Obsolescence {
    #[default]
    None,
    Mild,
    Moderate,
    Severe,
}

impl Obsolescence {
    /// Classify by the number of days between the current and recommended
    /// releases, never returning less than `floor`
    pub fn by_age(days: Option<i64>, floor: Obsolescence) -> Self {
        let by_days = match days {
            None => Self::None,
            Some(d) if d < MILD_AFTER_DAYS => Self::None,
            Some(d) if d < MODERATE_AFTER_DAYS => Self::Mild,
            Some(d) if d < SEVERE_AFTER_DAYS => Self::Moderate,
            Some(_) => Self::Severe,
        };
        by_days.max(floor)
    }
}

fn is_candidate(release: &Release) -> bool {
    !release.version.is_opaque() && !release.version.is_prerelease()
}

/// Pick the newest release old enough to be trusted.
///
/// Walking from newest to oldest, a release qualifies once it was published before
/// the time horizon and loosely satisfies every constraint. Each skipped release pulls
/// the horizon back to `MIN_STABLE_DAYS` before its own publication, so a run of
/// frequent releases keeps pushing the recommendation further back. Stepping into an
/// older major/minor line resets the horizon.
pub fn recommended_version(
    releases: &[Release],
    current: Option<&Version>,
    constraints: &[Constraint],
    now: DateTime<Utc>,
) -> Option<Version> {
    if releases.is_empty() {
        return None;
    }

    let orig_time_horizon = now - Duration::days(MIN_RELEASED_DAYS);
    let mut time_horizon = orig_time_horizon;
    let horizon_line = releases
        .iter()
        .find(|r| is_candidate(r))
        .and_then(|r| r.version.release_line());

    for release in releases.iter().filter(|r| is_candidate(r)) {
        let candidate = &release.version;

        if let Some(current) = current
            && current >= candidate
        {
            return Some(current.clone());
        }

        if candidate.release_line() < horizon_line {
            time_horizon = orig_time_horizon;
        }

        // a release exactly MIN_RELEASED_DAYS old qualifies
        if release.released <= time_horizon
            && constraints.iter().all(|c| c.satisfied_by_loosely(candidate))
        {
            return Some(candidate.clone());
        }

        time_horizon = time_horizon.min(release.released - Duration::days(MIN_STABLE_DAYS));
    }

    None
}

/// Whole days from the current version's release to the recommended version's release
///
/// A prerelease current version is matched against the newest release below it.
pub fn days_between(
    releases: &[Release],
    current: &Version,
    recommended: &Version,
) -> Option<i64> {
    let current_release = if current.is_prerelease() {
        releases.iter().find(|r| r.version < *current)
    } else {
        releases.iter().find(|r| r.version == *current)
    }?;
    let recommended_release = releases.iter().find(|r| r.version == *recommended)?;

    Some((recommended_release.released - current_release.released).num_days())
}

pub fn obsolescence(
    releases: &[Release],
    current: Option<&Version>,
    recommended: Option<&Version>,
) -> Obsolescence {
    let (Some(current), Some(recommended)) = (current, recommended) else {
        return Obsolescence::None;
    };
    let (Some(cv_major), Some(rv_major)) = (current.major(), recommended.major()) else {
        return Obsolescence::None;
    };

    if rv_major < cv_major {
        return Obsolescence::None;
    }

    let mut floor = Obsolescence::None;
    // across epochs only the elapsed time is meaningful
    if cv_major.0 == rv_major.0 {
        if cv_major.1 + 1 < rv_major.1 {
            return Obsolescence::Severe;
        }
        if cv_major.1 < rv_major.1 {
            floor = Obsolescence::Moderate;
        }
    }

    Obsolescence::by_age(days_between(releases, current, recommended), floor)
}
