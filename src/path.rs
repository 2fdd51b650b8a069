use std::borrow::Cow;

use crate::error::OriginError;

/// Validate and split a percent-encoded HTTP request path.
///
/// Returns `maxsegs` slots; segments that are not present come back as
/// `None`. With `rest_with_last`, the final segment keeps any remaining
/// slashes verbatim; otherwise trailing data makes the path invalid.
///
/// ```text
/// ["a"]             = split_path("/a", 1, 1, false)
/// ["a", None]       = split_path("/a", 1, 2, false)
/// ["a", "c"]        = split_path("/a/c", 1, 2, false)
/// ["a", "c", "o/r"] = split_path("/a/c/o/r", 1, 3, true)
/// ```
pub fn split_path(
    path: &str,
    minsegs: usize,
    maxsegs: usize,
    rest_with_last: bool,
) -> Result<Vec<Option<String>>, OriginError> {
    let path = percent_decode(path)?;
    debug_assert!(minsegs <= maxsegs && minsegs >= 1);

    let segs: Vec<&str> = if rest_with_last {
        path.splitn(maxsegs + 1, '/').collect()
    } else {
        path.splitn(maxsegs + 3, '/').collect()
    };
    let count = segs.len();

    let invalid = !segs[0].is_empty()
        || count < minsegs + 1
        || count > maxsegs + 2
        || segs[1..(minsegs + 1).min(count)].iter().any(|s| s.is_empty())
        || (!rest_with_last && count == maxsegs + 2 && !segs[maxsegs + 1].is_empty());
    if invalid {
        return Err(OriginError::InvalidPath(quote_path(&path)));
    }

    let mut out: Vec<Option<String>> = segs[1..count.min(maxsegs + 1)]
        .iter()
        .map(|s| Some((*s).to_string()))
        .collect();
    out.resize(maxsegs, None);
    Ok(out)
}

/// Percent-decode, failing when the decoded bytes are not valid UTF-8.
pub fn percent_decode(path: &str) -> Result<Cow<'_, str>, OriginError> {
    urlencoding::decode(path).map_err(|_| OriginError::InvalidUtf8)
}

/// Percent-encode a path, leaving slashes intact.
pub fn quote_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(path: &str, minsegs: usize, maxsegs: usize, rest: bool) -> Vec<Option<String>> {
        split_path(path, minsegs, maxsegs, rest).expect("path should split")
    }

    #[test]
    fn single_segment() {
        assert_eq!(ok("/a", 1, 1, false), vec![Some("a".to_string())]);
    }

    #[test]
    fn missing_trailing_segment_is_none() {
        assert_eq!(ok("/a", 1, 2, false), vec![Some("a".to_string()), None]);
    }

    #[test]
    fn two_segments() {
        assert_eq!(
            ok("/a/c", 1, 2, false),
            vec![Some("a".to_string()), Some("c".to_string())]
        );
    }

    #[test]
    fn rest_with_last_keeps_slashes() {
        assert_eq!(
            ok("/a/c/o/r", 1, 3, true),
            vec![
                Some("a".to_string()),
                Some("c".to_string()),
                Some("o/r".to_string())
            ]
        );
    }

    #[test]
    fn trailing_slash_tolerated_at_max_segments() {
        assert_eq!(ok("/a/", 1, 1, false), vec![Some("a".to_string())]);
    }

    #[test]
    fn no_leading_slash_is_invalid() {
        assert!(matches!(
            split_path("a/c", 1, 2, false),
            Err(OriginError::InvalidPath(_))
        ));
    }

    #[test]
    fn empty_required_segment_is_invalid() {
        assert!(matches!(
            split_path("//c", 1, 2, false),
            Err(OriginError::InvalidPath(_))
        ));
    }

    #[test]
    fn trailing_data_without_rest_is_invalid() {
        assert!(matches!(
            split_path("/a/c/o/r", 1, 3, false),
            Err(OriginError::InvalidPath(_))
        ));
    }

    #[test]
    fn too_few_segments_is_invalid() {
        assert!(matches!(
            split_path("/a", 2, 2, false),
            Err(OriginError::InvalidPath(_))
        ));
    }

    #[test]
    fn percent_decoding_applies_before_split() {
        assert_eq!(
            ok("/a%20b/c", 1, 2, false),
            vec![Some("a b".to_string()), Some("c".to_string())]
        );
    }

    #[test]
    fn invalid_utf8_percent_sequence() {
        assert!(matches!(
            split_path("/a/%ff", 1, 2, false),
            Err(OriginError::InvalidUtf8)
        ));
    }

    #[test]
    fn quote_path_preserves_slashes() {
        assert_eq!(quote_path("/v1/ac ct/c"), "/v1/ac%20ct/c");
    }
}
