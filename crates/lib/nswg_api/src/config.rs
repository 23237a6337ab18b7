//! API server configuration.

/// Configuration for the HTTP layer.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// Externally visible base URL, used to build the OAuth redirect URI.
    pub public_url: String,
    /// Mark the session cookie `Secure` (set behind HTTPS).
    pub secure_cookies: bool,
}

impl ApiConfig {
    /// OAuth callback URL registered with Discord.
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.public_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_joins_without_double_slash() {
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            public_url: "https://nswg1.example/".into(),
            secure_cookies: true,
        };
        assert_eq!(config.redirect_uri(), "https://nswg1.example/auth/callback");
    }
}
