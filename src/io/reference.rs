use crate::types::{CorrectionError, CorrectionResult};
use regex::Regex;
use std::path::Path;

/// Centre pixel of the reference area, used to annotate diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePoint {
    pub x: usize,
    pub y: usize,
}

impl ReferencePoint {
    /// Parse `x1:x2/y1:y2` (the first whitespace separated token)
    pub fn parse(text: &str) -> CorrectionResult<Self> {
        let token = text.split_whitespace().next().unwrap_or("");
        let separators = Regex::new(r"[:/]").map_err(|e| {
            CorrectionError::Processing(format!("Invalid reference separator pattern: {}", e))
        })?;
        let values: Vec<usize> = separators
            .split(token)
            .map(|v| v.parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| {
                CorrectionError::InvalidFormat(format!("Invalid reference area: '{}'", token))
            })?;

        match values.as_slice() {
            [x1, x2, y1, y2] => Ok(Self {
                x: (x1 + x2) / 2,
                y: (y1 + y2) / 2,
            }),
            _ => Err(CorrectionError::InvalidFormat(format!(
                "Reference area needs x1:x2/y1:y2, got '{}'",
                token
            ))),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CorrectionResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Reference point if the file exists and parses, `None` otherwise
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(point) => Some(point),
            Err(e) => {
                log::warn!("No reference point from {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_area() {
        let point = ReferencePoint::parse("10:13/40:45 extra\n").unwrap();
        assert_eq!(point, ReferencePoint { x: 11, y: 42 });
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ReferencePoint::parse("10:13/40").is_err());
        assert!(ReferencePoint::parse("a:b/c:d").is_err());
        assert!(ReferencePoint::parse("").is_err());
    }

    #[test]
    fn test_missing_file_is_optional() {
        assert_eq!(ReferencePoint::load_optional("/nonexistent/120ref.txt"), None);
    }
}
