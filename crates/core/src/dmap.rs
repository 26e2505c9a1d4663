//! DMAP metadata decoding.
//!
//! Track metadata arrives as a DMAP listing item: a stream of records, each
//! an 8-byte header (4-letter tag, big-endian u32 payload length) followed
//! by the payload. The outer record must be an `mlit` listing whose length
//! covers the rest of the buffer. Only UTF-8 string items are interpreted;
//! everything else is retained raw for diagnostics.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DmapError {
    #[error("metadata too short: {0} bytes")]
    TooShort(usize),

    #[error("invalid DMAP tag {0:?}")]
    InvalidTag([u8; 4]),

    #[error("outer record is '{0}', expected 'mlit'")]
    NotListing(String),

    #[error("declared length {declared} does not match remaining {remaining} bytes")]
    LengthMismatch { declared: usize, remaining: usize },
}

/// One raw DMAP record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmapItem {
    pub tag: String,
    pub data: Vec<u8>,
}

impl DmapItem {
    /// Payload as UTF-8, for string-typed tags.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

fn read_header(buf: &[u8]) -> Result<(String, usize), DmapError> {
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&buf[..4]);
    if !tag.iter().all(|b| b.is_ascii_alphabetic()) {
        return Err(DmapError::InvalidTag(tag));
    }
    let len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    // Tag bytes are ASCII-checked above.
    Ok((String::from_utf8_lossy(&tag).into_owned(), len))
}

/// Parse a DMAP `mlit` listing into its records.
pub fn parse_listing(buf: &[u8]) -> Result<Vec<DmapItem>, DmapError> {
    if buf.len() < 8 {
        return Err(DmapError::TooShort(buf.len()));
    }
    let (tag, declared) = read_header(buf)?;
    let body = &buf[8..];
    if tag != "mlit" {
        return Err(DmapError::NotListing(tag));
    }
    if declared != body.len() {
        return Err(DmapError::LengthMismatch {
            declared,
            remaining: body.len(),
        });
    }

    let mut items = Vec::new();
    let mut rest = body;
    while rest.len() >= 8 {
        let (tag, len) = read_header(rest)?;
        rest = &rest[8..];
        if len > rest.len() {
            return Err(DmapError::LengthMismatch {
                declared: len,
                remaining: rest.len(),
            });
        }
        items.push(DmapItem {
            tag,
            data: rest[..len].to_vec(),
        });
        rest = &rest[len..];
    }
    if !rest.is_empty() {
        return Err(DmapError::TooShort(rest.len()));
    }
    Ok(items)
}

/// Human-readable label for the string-typed DMAP tags seen in practice.
pub fn display_label(tag: &str) -> Option<&'static str> {
    Some(match tag {
        "minm" => "Title",
        "asaa" => "Album artist",
        "asal" => "Album",
        "asar" => "Artist",
        "ascm" => "Comment",
        "ascn" => "Content description",
        "ascp" => "Composer",
        "asct" => "Category",
        "asdt" => "Description",
        "asfm" => "Format",
        "asgn" => "Genre",
        "asky" => "Keywords",
        "aslc" => "Long content description",
        "assa" => "Sort artist",
        "assc" => "Sort composer",
        "assl" => "Sort album artist",
        "assn" => "Sort name",
        "asss" => "Sort series",
        "assu" => "Sort album",
        _ => return None,
    })
}

/// The commonly displayed subset of track metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    /// Records with no dedicated field, kept raw.
    pub extra: Vec<DmapItem>,
}

impl TrackMetadata {
    pub fn from_listing(buf: &[u8]) -> Result<Self, DmapError> {
        let mut meta = Self::default();
        for item in parse_listing(buf)? {
            let text = item.as_text().map(str::to_owned);
            match (item.tag.as_str(), text) {
                ("minm", Some(t)) => meta.title = Some(t),
                ("asar", Some(t)) => meta.artist = Some(t),
                ("asal", Some(t)) => meta.album = Some(t),
                ("asaa", Some(t)) => meta.album_artist = Some(t),
                ("ascp", Some(t)) => meta.composer = Some(t),
                ("asgn", Some(t)) => meta.genre = Some(t),
                _ => meta.extra.push(item),
            }
        }
        Ok(meta)
    }
}

impl fmt::Display for TrackMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for (label, value) in [
            ("Title", &self.title),
            ("Artist", &self.artist),
            ("Album", &self.album),
        ] {
            if let Some(value) = value {
                if wrote {
                    write!(f, ", ")?;
                }
                write!(f, "{label}: {value}")?;
                wrote = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(tag.as_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn listing(items: &[(&str, &[u8])]) -> Vec<u8> {
        let body: Vec<u8> = items
            .iter()
            .flat_map(|(tag, data)| record(tag, data))
            .collect();
        record("mlit", &body)
    }

    #[test]
    fn parses_track_metadata() {
        let buf = listing(&[
            ("minm", b"Blue in Green"),
            ("asar", b"Miles Davis"),
            ("asal", b"Kind of Blue"),
            ("asgn", b"Jazz"),
        ]);
        let meta = TrackMetadata::from_listing(&buf).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Blue in Green"));
        assert_eq!(meta.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(meta.album.as_deref(), Some("Kind of Blue"));
        assert_eq!(meta.genre.as_deref(), Some("Jazz"));
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn unknown_tags_kept_raw() {
        let buf = listing(&[("astm", &1000u32.to_be_bytes())]);
        let meta = TrackMetadata::from_listing(&buf).unwrap();
        assert_eq!(meta.extra.len(), 1);
        assert_eq!(meta.extra[0].tag, "astm");
    }

    #[test]
    fn rejects_short_buffer() {
        assert_eq!(parse_listing(&[0u8; 4]).unwrap_err(), DmapError::TooShort(4));
    }

    #[test]
    fn rejects_non_listing() {
        let buf = record("minm", b"title");
        assert_eq!(
            parse_listing(&buf).unwrap_err(),
            DmapError::NotListing("minm".into())
        );
    }

    #[test]
    fn rejects_non_alpha_tag() {
        let mut buf = listing(&[("minm", b"x")]);
        buf[8] = 0x01; // corrupt first inner tag byte
        assert!(matches!(
            parse_listing(&buf).unwrap_err(),
            DmapError::InvalidTag(_)
        ));
    }

    #[test]
    fn rejects_length_overrun() {
        let mut buf = listing(&[("minm", b"abc")]);
        // Inflate the inner record's declared length past the buffer end.
        let inner_len_at = 8 + 4;
        buf[inner_len_at..inner_len_at + 4].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            parse_listing(&buf).unwrap_err(),
            DmapError::LengthMismatch { .. }
        ));
    }

    #[test]
    fn display_labels() {
        assert_eq!(display_label("minm"), Some("Title"));
        assert_eq!(display_label("zzzz"), None);
    }
}
