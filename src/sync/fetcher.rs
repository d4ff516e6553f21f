//! Fetch collaborators. The transport itself (HTTP, CDN, authentication) lives outside this crate.
use crate::{split::SplitChange, Result};

/// Fetches split changes from the remote origin.
pub trait SplitFetcher: Send + Sync {
    /// Fetch every split that changed after `since`. `query` restricts the set of splits
    /// (e.g., `names=a,b`).
    ///
    /// Implementations should map a rejected API key to [`Error::Unauthorized`](crate::Error)
    /// so that workers stop retrying.
    fn fetch(&self, since: i64, query: Option<&str>) -> Result<SplitChange>;
}

/// Fetches the segments a user key belongs to.
pub trait SegmentsFetcher: Send + Sync {
    /// Fetch the names of all segments `key` belongs to.
    fn fetch(&self, key: &str) -> Result<Vec<String>>;
}

/// Parse a split changes response body.
///
/// Splits that fail to parse are kept as [`TryParse::ParseFailed`](crate::split::TryParse) so
/// that one unexpected definition doesn't block the others.
pub fn parse_split_change(body: &[u8]) -> Result<SplitChange> {
    Ok(serde_json::from_slice(body)?)
}

/// Parse a segments response body: `{"mySegments": [{"name": "..."}]}`.
pub fn parse_segments(body: &[u8]) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SegmentsResponse {
        my_segments: Vec<Segment>,
    }

    #[derive(serde::Deserialize)]
    struct Segment {
        name: String,
    }

    let response: SegmentsResponse = serde_json::from_slice(body)?;
    Ok(response
        .my_segments
        .into_iter()
        .map(|segment| segment.name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{parse_segments, parse_split_change};
    use crate::{split::TryParse, Error};

    #[test]
    fn parses_split_change_body() {
        let change = parse_split_change(
            br#"{"since": 5, "till": 6, "splits": [{"name": "a", "changeNumber": 6}, {"name": 1}]}"#,
        )
        .unwrap();
        assert_eq!((change.since, change.till), (5, 6));
        assert!(matches!(change.splits[0], TryParse::Parsed(_)));
        assert!(matches!(change.splits[1], TryParse::ParseFailed(_)));
    }

    #[test]
    fn invalid_body_is_parse_error() {
        let err = parse_split_change(b"<html>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn parses_segments_body() {
        let segments =
            parse_segments(br#"{"mySegments": [{"id": "1", "name": "employees"}, {"name": "beta"}]}"#)
                .unwrap();
        assert_eq!(segments, ["employees", "beta"]);
    }
}
