use rand::Rng;
use rand::seq::SliceRandom;

pub const TOKEN_LENGTH: usize = 32;
pub const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A validated session token: exactly 32 characters drawn from `[A-Z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Returns an instance of `Token` if the input satisfies the
    /// length and charset constraints, an error message otherwise.
    pub fn parse(s: String) -> Result<Token, String> {
        if s.len() != TOKEN_LENGTH {
            return Err(format!(
                "token must be exactly {} characters, got {}",
                TOKEN_LENGTH,
                s.len()
            ));
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_uppercase() && !c.is_ascii_digit()) {
            return Err(format!("token contains forbidden character {c:?}"));
        }
        Ok(Self(s))
    }

    /// Generates a random token from the caller's RNG. Passing a seeded
    /// RNG gives reproducible sequences, which scenario generation relies on.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Token {
        Self::generate_with_prefix(rng, "")
    }

    /// Generates a random token starting with `prefix`. The prefix is how
    /// scenarios target prefix-matched mock rules; it must itself be valid
    /// token material and shorter than the token.
    pub fn generate_with_prefix<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> Token {
        debug_assert!(prefix.len() < TOKEN_LENGTH);
        debug_assert!(prefix.bytes().all(|b| TOKEN_CHARSET.contains(&b)));
        let mut value = String::with_capacity(TOKEN_LENGTH);
        value.push_str(prefix);
        while value.len() < TOKEN_LENGTH {
            let c = *TOKEN_CHARSET
                .choose(rng)
                .expect("token charset is non-empty");
            value.push(c as char);
        }
        Self(value)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What actually goes on the wire in the `token` field.
///
/// Malformed tokens are a test category of their own: they are submitted
/// deliberately, never filtered out before the request is sent. Anything
/// that fails `Token::parse` travels as `Malformed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSubmission {
    Valid(Token),
    Malformed(String),
}

impl TokenSubmission {
    pub fn as_str(&self) -> &str {
        match self {
            TokenSubmission::Valid(token) => token.as_ref(),
            TokenSubmission::Malformed(raw) => raw,
        }
    }
}

impl From<Token> for TokenSubmission {
    fn from(token: Token) -> Self {
        TokenSubmission::Valid(token)
    }
}
