use anyhow::{Context, Result, anyhow};
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Returns `None` when no username was supplied.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        let username = username.filter(|value| !value.is_empty())?;
        Some(Self {
            username,
            password: password.unwrap_or_default(),
        })
    }
}

/// Builds the locator handed to the decoder.
///
/// Credentials are percent-encoded into the authority. Without credentials the
/// URL is passed through untouched.
pub fn compose_source_url(url: &str, credentials: Option<&Credentials>) -> Result<String> {
    let url = url.trim();
    let Some(credentials) = credentials else {
        return Ok(url.to_owned());
    };

    let mut parsed = Url::parse(url).context("source URL is not a valid URL")?;
    parsed
        .set_username(&credentials.username)
        .map_err(|_| anyhow!("source URL cannot carry credentials"))?;
    parsed
        .set_password(Some(&credentials.password))
        .map_err(|_| anyhow!("source URL cannot carry credentials"))?;
    Ok(parsed.into())
}

/// Masks the password of a source URL for logging.
pub fn redact_source_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("***")).is_err() {
                return "***".to_owned();
            }
            parsed.into()
        }
        Ok(_) => url.to_owned(),
        Err(_) if url.contains('@') => "***".to_owned(),
        Err(_) => url.to_owned(),
    }
}
