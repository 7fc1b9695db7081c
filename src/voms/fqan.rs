//! FQAN (Fully Qualified Attribute Name) parsing.
//!
//! An FQAN is a path-like string encoding a VO group hierarchy plus role
//! and capability, e.g. `/atlas/production/Role=pilot/Capability=NULL`.
//! The last two segments are always the `Role=` and `Capability=` markers;
//! everything before them is the VO group path.

use thiserror::Error;

/// One decoded FQAN.
///
/// `role` and `capability` carry the literal segment value, including the
/// sentinel `"NULL"` when the attribute certificate omits them. That
/// sentinel is preserved verbatim; deciding what it means is the policy
/// layer's job, not the parser's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFqan {
    /// VO group path, segments rejoined with `/` (e.g. `/atlas/production`)
    pub vo_group: String,
    /// Role value, `"NULL"` if the certificate encodes none
    pub role: String,
    /// Capability value, `"NULL"` if the certificate encodes none
    pub capability: String,
}

/// FQAN grammar violations.
///
/// A malformed FQAN coming out of a successfully validated attribute
/// certificate is an integrity failure, never silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FqanParseError {
    /// Fewer segments than `<group>/Role=<r>/Capability=<c>` requires
    #[error("FQAN has too few segments")]
    TooFewSegments,
    /// Next-to-last segment is not `Role=<value>`
    #[error("FQAN next-to-last segment is not a Role marker")]
    MissingRole,
    /// Last segment is not `Capability=<value>`
    #[error("FQAN last segment is not a Capability marker")]
    MissingCapability,
}

/// Parse a raw FQAN into its `(vo_group, role, capability)` parts.
///
/// Deterministic for well-formed input; pure, no I/O.
pub fn parse_fqan(fqan: &str) -> Result<ParsedFqan, FqanParseError> {
    let mut segments: Vec<&str> = fqan.split('/').collect();
    if segments.len() < 3 {
        return Err(FqanParseError::TooFewSegments);
    }

    let capability = segments
        .pop()
        .and_then(|s| s.strip_prefix("Capability="))
        .ok_or(FqanParseError::MissingCapability)?
        .to_owned();
    let role = segments
        .pop()
        .and_then(|s| s.strip_prefix("Role="))
        .ok_or(FqanParseError::MissingRole)?
        .to_owned();

    Ok(ParsedFqan {
        vo_group: segments.join("/"),
        role,
        capability,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_group_role_and_capability() {
        let parsed = parse_fqan("/vo/group/Role=role1/Capability=cap1").unwrap();
        assert_eq!(
            parsed,
            ParsedFqan {
                vo_group: "/vo/group".to_string(),
                role: "role1".to_string(),
                capability: "cap1".to_string(),
            }
        );
    }

    #[test]
    fn preserves_null_markers_verbatim() {
        let parsed = parse_fqan("/vo/Role=NULL/Capability=NULL").unwrap();
        assert_eq!(parsed.vo_group, "/vo");
        assert_eq!(parsed.role, "NULL");
        assert_eq!(parsed.capability, "NULL");
    }

    #[test]
    fn deep_group_hierarchy_is_rejoined() {
        let parsed =
            parse_fqan("/atlas/production/reco/Role=pilot/Capability=NULL").unwrap();
        assert_eq!(parsed.vo_group, "/atlas/production/reco");
        assert_eq!(parsed.role, "pilot");
    }

    #[test]
    fn missing_capability_marker_fails() {
        assert_eq!(
            parse_fqan("/vo/group/Role=role1/cap1"),
            Err(FqanParseError::MissingCapability)
        );
    }

    #[test]
    fn missing_role_marker_fails() {
        assert_eq!(
            parse_fqan("/vo/group/role1/Capability=cap1"),
            Err(FqanParseError::MissingRole)
        );
    }

    #[test]
    fn missing_equals_is_not_defaulted() {
        // `Role` without `=` must surface as an error, never parse to an
        // empty role.
        assert_eq!(
            parse_fqan("/vo/Role/Capability=NULL"),
            Err(FqanParseError::MissingRole)
        );
    }

    #[test]
    fn too_few_segments_fails() {
        assert_eq!(parse_fqan("/vo"), Err(FqanParseError::TooFewSegments));
        assert_eq!(parse_fqan(""), Err(FqanParseError::TooFewSegments));
    }

    #[test]
    fn empty_values_are_kept_distinct_from_missing_markers() {
        // `Role=` with an empty value is well-formed; the value is "".
        let parsed = parse_fqan("/vo/Role=/Capability=").unwrap();
        assert_eq!(parsed.role, "");
        assert_eq!(parsed.capability, "");
    }
}
