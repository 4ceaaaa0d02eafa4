//! Listing continuation state.
//!
//! Vendors page their listings three different ways. Adapters translate their native
//! continuation into a [`Cursor`] and the engine only ever asks "is there a next one".

use serde::{Deserialize, Serialize};

/// Continuation for one vendor listing. Lives for a single pass only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cursor {
    /// Opaque server token (AWS `NextToken`, Azure `nextLink`).
    Token(String),
    /// Key of the last item on the previous page (HuaWei).
    Marker(String),
    /// Explicit window (TCloud).
    Offset { offset: usize, limit: usize },
}

impl Cursor {
    /// Wrap a server token. Empty or missing tokens end the listing.
    pub fn from_token(token: Option<String>) -> Option<Cursor> {
        token.filter(|t| !t.is_empty()).map(Cursor::Token)
    }

    /// Marker continuation: a short page ends the listing.
    pub fn after_marker(page_len: usize, limit: usize, last_key: Option<&str>) -> Option<Cursor> {
        if page_len < limit {
            return None;
        }
        last_key
            .filter(|k| !k.is_empty())
            .map(|k| Cursor::Marker(k.to_string()))
    }

    /// Offset continuation: a short page ends the listing.
    pub fn after_offset(offset: usize, page_len: usize, limit: usize) -> Option<Cursor> {
        if limit == 0 || page_len < limit {
            return None;
        }
        Some(Cursor::Offset {
            offset: offset + limit,
            limit,
        })
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Cursor::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn marker(&self) -> Option<&str> {
        match self {
            Cursor::Marker(m) => Some(m),
            _ => None,
        }
    }

    /// Window start, `0` for non-offset cursors.
    pub fn offset(&self) -> usize {
        match self {
            Cursor::Offset { offset, .. } => *offset,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_ends_listing() {
        assert_eq!(Cursor::from_token(None), None);
        assert_eq!(Cursor::from_token(Some(String::new())), None);
        assert_eq!(
            Cursor::from_token(Some("abc".into())),
            Some(Cursor::Token("abc".into()))
        );
    }

    #[test]
    fn test_marker_stops_on_short_page() {
        assert_eq!(Cursor::after_marker(999, 1000, Some("rtb-9")), None);
        assert_eq!(
            Cursor::after_marker(1000, 1000, Some("rtb-9")),
            Some(Cursor::Marker("rtb-9".into()))
        );
        assert_eq!(Cursor::after_marker(1000, 1000, None), None);
    }

    #[test]
    fn test_offset_advances_by_limit() {
        let next = Cursor::after_offset(0, 100, 100).unwrap();
        assert_eq!(next, Cursor::Offset { offset: 100, limit: 100 });
        assert_eq!(next.offset(), 100);
        assert_eq!(Cursor::after_offset(100, 42, 100), None);
        assert_eq!(Cursor::after_offset(0, 0, 0), None);
    }
}
