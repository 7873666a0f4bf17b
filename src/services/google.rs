use async_trait::async_trait;
use serde::Deserialize;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Identity claims taken from a verified Google ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> anyhow::Result<GoogleProfile>;
}

/// Verifies ID tokens through Google's tokeninfo endpoint.
pub struct TokenInfoVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl TokenInfoVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub aud: String,
    pub iss: Option<String>,
    pub sub: String,
    pub email: Option<String>,
    /// tokeninfo reports booleans as strings.
    pub email_verified: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

pub fn profile_from_token_info(info: TokenInfo, client_id: &str) -> anyhow::Result<GoogleProfile> {
    if client_id.is_empty() || info.aud != client_id {
        anyhow::bail!("token audience does not match client id");
    }
    if let Some(iss) = info.iss.as_deref() {
        if !GOOGLE_ISSUERS.contains(&iss) {
            anyhow::bail!("unexpected token issuer {iss}");
        }
    }
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| anyhow::anyhow!("token carries no email"))?;

    Ok(GoogleProfile {
        sub: info.sub,
        email,
        email_verified: info.email_verified.as_deref() == Some("true"),
        name: info.name,
        given_name: info.given_name,
        family_name: info.family_name,
        picture: info.picture,
    })
}

#[async_trait]
impl GoogleVerifier for TokenInfoVerifier {
    async fn verify(&self, id_token: &str) -> anyhow::Result<GoogleProfile> {
        let response = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("tokeninfo rejected token with status {}", response.status());
        }

        let info: TokenInfo = response.json().await?;
        profile_from_token_info(info, &self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str) -> TokenInfo {
        TokenInfo {
            aud: aud.into(),
            iss: Some("https://accounts.google.com".into()),
            sub: "1001".into(),
            email: Some("ana@example.com".into()),
            email_verified: Some("true".into()),
            name: Some("Ana Novak".into()),
            given_name: Some("Ana".into()),
            family_name: Some("Novak".into()),
            picture: None,
        }
    }

    #[test]
    fn matching_audience_yields_profile() {
        let profile = profile_from_token_info(info("client-1"), "client-1").unwrap();
        assert_eq!(profile.sub, "1001");
        assert_eq!(profile.email, "ana@example.com");
        assert!(profile.email_verified);
    }

    #[test]
    fn foreign_audience_is_rejected() {
        assert!(profile_from_token_info(info("someone-else"), "client-1").is_err());
        assert!(profile_from_token_info(info(""), "").is_err());
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let mut token = info("client-1");
        token.iss = Some("https://evil.example".into());
        assert!(profile_from_token_info(token, "client-1").is_err());
    }

    #[test]
    fn missing_email_is_rejected() {
        let mut token = info("client-1");
        token.email = None;
        assert!(profile_from_token_info(token, "client-1").is_err());
    }
}
