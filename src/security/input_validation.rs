use std::sync::LazyLock;
use regex::Regex;
use url::Url;
use crate::errors::{AppError, Result};
use crate::metadata::CatalogKind;

static CATALOG_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:intl-[a-zA-Z-]+/)?(track|album|playlist)/([a-zA-Z0-9]+)/?$")
        .expect("catalog link pattern is valid")
});

/// The transport's limit for inline button payloads.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Anything handed to the extraction tool as is.
    Media(String),
    /// A streaming-catalog item, looked up by id.
    Catalog { kind: CatalogKind, id: String },
}

pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// First `http(s)://` token of a chat message.
    pub fn extract_url<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.split_whitespace()
            .find(|word| word.starts_with("http://") || word.starts_with("https://"))
    }

    pub fn validate_url(&self, url: &str) -> Result<Url> {
        if url.is_empty() {
            return Err(AppError::InvalidInput("URL cannot be empty".to_string()));
        }

        let parsed_url = Url::parse(url)
            .map_err(|e| AppError::InvalidInput(format!("Invalid URL: {}", e)))?;

        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(AppError::InvalidInput(format!("Unsupported scheme: {}", parsed_url.scheme())));
        }

        if parsed_url.host_str().map_or(true, str::is_empty) {
            return Err(AppError::InvalidInput("URL must have a host".to_string()));
        }

        Ok(parsed_url)
    }

    fn is_catalog_host(host: &str) -> bool {
        host == "spotify.com" || host.ends_with(".spotify.com")
    }

    /// Decides which flow a message goes to.
    pub fn classify(&self, text: &str) -> Result<Link> {
        let raw = self
            .extract_url(text)
            .ok_or_else(|| AppError::InvalidInput("message contains no link".to_string()))?;
        let url = self.validate_url(raw)?;
        let host = url.host_str().unwrap_or_default();

        if !Self::is_catalog_host(host) {
            return Ok(Link::Media(raw.to_string()));
        }

        let captures = CATALOG_LINK
            .captures(url.path())
            .ok_or_else(|| AppError::InvalidInput(format!("Unrecognized Spotify link: {}", raw)))?;
        let kind = CatalogKind::parse(&captures[1])
            .ok_or_else(|| AppError::InvalidInput(format!("Unsupported Spotify item: {}", &captures[1])))?;

        Ok(Link::Catalog { kind, id: captures[2].to_string() })
    }

    pub fn validate_callback_data(&self, data: &str) -> Result<()> {
        if data.len() > MAX_CALLBACK_DATA_LEN {
            return Err(AppError::InvalidInput(format!(
                "Callback payload too long ({} > {} bytes)",
                data.len(),
                MAX_CALLBACK_DATA_LEN
            )));
        }
        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_catalog_links() {
        let validator = InputValidator::new();
        assert_eq!(
            validator.classify("check https://open.spotify.com/album/4aawyAB9vmqN3uQ7FjRGTy?si=x").unwrap(),
            Link::Catalog { kind: CatalogKind::Album, id: "4aawyAB9vmqN3uQ7FjRGTy".into() }
        );
        assert_eq!(
            validator.classify("https://open.spotify.com/intl-de/track/11dFghVXANMlKmJXsNCbNl").unwrap(),
            Link::Catalog { kind: CatalogKind::Track, id: "11dFghVXANMlKmJXsNCbNl".into() }
        );
    }

    #[test]
    fn other_links_are_media() {
        let validator = InputValidator::new();
        assert_eq!(
            validator.classify("https://youtu.be/dQw4w9WgXcQ").unwrap(),
            Link::Media("https://youtu.be/dQw4w9WgXcQ".into())
        );
    }

    #[test]
    fn rejects_non_links_and_unknown_catalog_items() {
        let validator = InputValidator::new();
        assert!(validator.classify("hello there").is_err());
        assert!(validator.classify("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF").is_err());
        assert!(validator.validate_url("ftp://example.com/file").is_err());
    }

    #[test]
    fn callback_payload_limit() {
        let validator = InputValidator::new();
        assert!(validator.validate_callback_data("dl:audio:0123456789ab").is_ok());
        assert!(validator.validate_callback_data(&"x".repeat(65)).is_err());
    }
}
