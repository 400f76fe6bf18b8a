//! Semantic-version range resolution against a finite set of candidates
//!
//! Buildpack detect scripts request a runtime either as the literal token
//! `default` (resolved by the caller to the buildpack's configured default
//! range) or as a semver range expression. This module parses ranges and
//! picks the best available version for them.

use semver::{Version, VersionReq};

/// The token a detect script prints to request the buildpack's default range.
pub const DEFAULT_TOKEN: &str = "default";

/// Parses a semver range expression.
///
/// `default` is not valid input here; callers substitute the buildpack's
/// configured default range before parsing. Invalid syntax is reported to
/// the caller, which decides whether it is a script-contract error or a
/// buildpack misconfiguration.
pub fn parse_range(spec: &str) -> Result<VersionReq, semver::Error> {
    VersionReq::parse(spec.trim())
}

/// Returns the highest version in `available` satisfying `range`.
///
/// Deterministic for the same inputs. `None` means no candidate satisfies
/// the range; callers report the full candidate list for remediation.
pub fn best_match<'a, I>(range: &VersionReq, available: I) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    available
        .into_iter()
        .filter(|v| range.matches(v))
        .max()
}
