//! Wildcard matching for SignalK paths and contexts.
//!
//! Both paths ("navigation.speedOverGround") and contexts
//! ("vessels.urn:mrn:signalk:uuid:...") are dot-separated, so one segment
//! matcher serves subscriptions on either.

/// A segment in a pattern.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    /// `*`: one segment mid-pattern, any (possibly empty) suffix at the end.
    Wildcard,
}

/// A subscription pattern that may contain wildcards.
///
/// Supported patterns:
/// - Exact: "navigation.speedOverGround"
/// - Suffix wildcard: "navigation.*"
/// - Mid-path wildcard: "propulsion.*.revolutions"
/// - Full wildcard: "*"
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let segments = pattern
            .split('.')
            .map(|s| match s {
                "*" => Ok(Segment::Wildcard),
                "" => Err(PatternError::EmptySegment(pattern.to_string())),
                lit => Ok(Segment::Literal(lit.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Check if a path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('.');
        let last = self.segments.len() - 1;

        for (i, segment) in self.segments.iter().enumerate() {
            if i == last && *segment == Segment::Wildcard {
                return true;
            }
            match (segment, parts.next()) {
                (Segment::Literal(lit), Some(part)) if part == lit => {}
                (Segment::Wildcard, Some(part)) if !part.is_empty() => {}
                _ => return false,
            }
        }

        parts.next().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Errors that can occur when creating a path pattern.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Empty pattern")]
    EmptyPattern,

    #[error("Empty segment in pattern '{0}'")]
    EmptySegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let pattern = PathPattern::new("navigation.speedOverGround").unwrap();
        assert!(pattern.matches("navigation.speedOverGround"));
        assert!(!pattern.matches("navigation.courseOverGroundTrue"));
        assert!(!pattern.matches("navigation"));
        assert!(!pattern.matches("navigation.speedOverGround.extra"));
    }

    #[test]
    fn test_suffix_wildcard() {
        let pattern = PathPattern::new("navigation.*").unwrap();
        assert!(pattern.matches("navigation.position"));
        assert!(pattern.matches("navigation.course.rhumbline.nextPoint"));
        assert!(!pattern.matches("environment.wind.speedApparent"));
        assert!(!pattern.matches("navigationx.position"));
    }

    #[test]
    fn test_mid_path_wildcard() {
        let pattern = PathPattern::new("propulsion.*.revolutions").unwrap();
        assert!(pattern.matches("propulsion.port.revolutions"));
        assert!(!pattern.matches("propulsion.port.oilPressure"));
        assert!(!pattern.matches("propulsion.revolutions"));
    }

    #[test]
    fn test_full_wildcard() {
        let pattern = PathPattern::new("*").unwrap();
        assert!(pattern.matches("anything.at.all"));
        assert!(pattern.matches(""));
    }

    #[test]
    fn test_context_patterns() {
        let pattern = PathPattern::new("vessels.*").unwrap();
        assert!(pattern.matches("vessels.urn:mrn:signalk:uuid:c0d79334-4e25-4245-8892-54e8ccc8021d"));
        assert!(!pattern.matches("atons.urn:mrn:imo:mmsi:993456789"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(PathPattern::new("").unwrap_err(), PatternError::EmptyPattern);
        assert!(matches!(
            PathPattern::new("navigation..position"),
            Err(PatternError::EmptySegment(_))
        ));
    }
}
