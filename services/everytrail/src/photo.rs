use crate::response::{lookup, text_of};
use everytrail_core::{Error, Result};
use http::Uri;
use serde_json::Value;

/// Size modifier of thumbnails.
pub const THUMBNAIL_SIZE: &str = "thumbnail";
/// Size modifier of full size pictures.
pub const FULL_SIZE: &str = "fullsize";

/// Sizes a photo is served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSize {
    /// Small preview.
    Thumbnail,
    /// Original picture.
    FullSize,
}

impl PhotoSize {
    /// The size modifier used in responses and URLs.
    pub fn modifier(&self) -> &'static str {
        match self {
            PhotoSize::Thumbnail => THUMBNAIL_SIZE,
            PhotoSize::FullSize => FULL_SIZE,
        }
    }
}

/// Build the source URL of a photo from its mapping.
///
/// The field named after the size modifier is used when present:
///
/// ```xml
/// <picture id="7"><thumbnail>http://images.everytrail.com/pics/7_thumbnail.jpg</thumbnail></picture>
/// ```
///
/// Otherwise the size modifier is inserted before the extension of the `url` field,
/// so `http://images.everytrail.com/pics/7.jpg` becomes `http://images.everytrail.com/pics/7_thumbnail.jpg`.
pub fn photo_source_url(photo: &Value, size: PhotoSize) -> Result<Uri> {
    if let Some(url) = lookup(photo, size.modifier()).and_then(text_of) {
        return parse_url(url.trim());
    }

    let base = lookup(photo, "url")
        .and_then(text_of)
        .map(str::trim)
        .ok_or_else(|| {
            Error::faulty_response(format!(
                "photo has neither `{}` nor `url` field",
                size.modifier()
            ))
        })?;
    with_size_suffix(&parse_url(base)?, size.modifier())
}

fn parse_url(url: &str) -> Result<Uri> {
    url.parse::<Uri>().map_err(|e| {
        Error::faulty_response(format!("photo has an invalid source url: {url}")).with_source(e)
    })
}

/// Insert `_{modifier}` before the extension of the last path segment.
fn with_size_suffix(uri: &Uri, modifier: &str) -> Result<Uri> {
    let path = uri.path();
    let file = path.rsplit('/').next().unwrap_or_default();
    if file.is_empty() {
        return Err(Error::faulty_response(format!(
            "photo url has no file name: {uri}"
        )));
    }

    let stem = file.rfind('.').unwrap_or(file.len());
    let dir = &path[..path.len() - file.len()];
    let mut path_and_query = format!("{dir}{}_{modifier}{}", &file[..stem], &file[stem..]);
    if let Some(query) = uri.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().map_err(|e| {
        Error::faulty_response(format!("photo has an invalid source url: {uri}")).with_source(e)
    })?);
    Uri::from_parts(parts).map_err(|e| {
        Error::faulty_response(format!("photo has an invalid source url: {uri}")).with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use everytrail_core::ErrorKind;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_photo_source_url_from_size_field() {
        let photo = json!({
            "id": "7",
            "thumbnail": {"_text": "http://images.everytrail.com/pics/7_t.jpg"},
            "fullsize": "http://images.everytrail.com/pics/7_f.jpg",
        });

        assert_eq!(
            photo_source_url(&photo, PhotoSize::Thumbnail).unwrap(),
            "http://images.everytrail.com/pics/7_t.jpg"
        );
        assert_eq!(
            photo_source_url(&photo, PhotoSize::FullSize).unwrap(),
            "http://images.everytrail.com/pics/7_f.jpg"
        );
    }

    #[test_case("http://images.everytrail.com/pics/7.jpg", PhotoSize::Thumbnail, "http://images.everytrail.com/pics/7_thumbnail.jpg")]
    #[test_case("http://images.everytrail.com/pics/7.jpg", PhotoSize::FullSize, "http://images.everytrail.com/pics/7_fullsize.jpg")]
    #[test_case("http://images.everytrail.com/pics/7", PhotoSize::Thumbnail, "http://images.everytrail.com/pics/7_thumbnail")]
    #[test_case("http://images.everytrail.com/pics/7.jpg?v=2", PhotoSize::Thumbnail, "http://images.everytrail.com/pics/7_thumbnail.jpg?v=2")]
    #[test_case("http://images.everytrail.com/pics.v2/7", PhotoSize::FullSize, "http://images.everytrail.com/pics.v2/7_fullsize")]
    fn test_photo_source_url_from_url(url: &str, size: PhotoSize, expected: &str) {
        let photo = json!({"url": {"_text": url}});
        assert_eq!(photo_source_url(&photo, size).unwrap(), expected);
    }

    #[test]
    fn test_photo_source_url_missing() {
        let err = photo_source_url(&json!({"id": "7"}), PhotoSize::Thumbnail).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaultyResponse);

        let err = photo_source_url(&json!({"url": "not a url"}), PhotoSize::FullSize).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaultyResponse);
    }

    #[test_case("http://images.everytrail.com"; "no path")]
    #[test_case("http://images.everytrail.com/"; "root path")]
    #[test_case("http://images.everytrail.com/pics/"; "directory")]
    fn test_photo_source_url_without_file_name(url: &str) {
        let err = photo_source_url(&json!({"url": url}), PhotoSize::Thumbnail).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaultyResponse);
    }
}
