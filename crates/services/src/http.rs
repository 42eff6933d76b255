use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ContentError;

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ContentError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ContentError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn check_status(response: Response) -> Result<Response, ContentError> {
    match response.status() {
        StatusCode::NOT_FOUND => Err(ContentError::NotFound),
        status if !status.is_success() => Err(ContentError::HttpStatus(status)),
        _ => Ok(response),
    }
}

pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: Url) -> Result<T, ContentError> {
    tracing::debug!(%url, "GET");
    let response = client.get(url).send().await?;
    let body = check_status(response)?.json().await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_segments_and_keeps_base_path() {
        let base = Url::parse("https://lms.example.com/api/").unwrap();
        let url = endpoint(&base, &["courses", "CS 101", "lectures", "L/1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://lms.example.com/api/courses/CS%20101/lectures/L%2F1"
        );
    }

    #[test]
    fn endpoint_rejects_cannot_be_a_base_urls() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(matches!(
            endpoint(&base, &["courses"]),
            Err(ContentError::InvalidBaseUrl(_))
        ));
    }
}
