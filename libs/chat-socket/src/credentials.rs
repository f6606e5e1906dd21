//! Bearer token sources.

/// Yields the bearer token for REST calls and the STOMP handshake, or `None`
/// when the user is not signed in.
pub trait CredentialSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, typically handed over by a login flow.
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self((!token.trim().is_empty()).then_some(token))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from an environment variable on every call, so a token
/// refreshed by another process is picked up without restarting.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub const DEFAULT_VAR: &'static str = "CHAT_TOKEN";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl CredentialSource for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_static_token_is_none() {
        assert_eq!(StaticToken::new("  ").token(), None);
        assert_eq!(StaticToken::new("abc").token().as_deref(), Some("abc"));
        assert_eq!(StaticToken::none().token(), None);
    }

    #[test]
    fn env_token_reads_variable() {
        let var = "CHAT_SOCKET_TEST_TOKEN_ENV";
        let source = EnvToken::new(var);
        std::env::remove_var(var);
        assert_eq!(source.token(), None);
        std::env::set_var(var, " t0ken ");
        assert_eq!(source.token().as_deref(), Some("t0ken"));
        std::env::remove_var(var);
    }
}
