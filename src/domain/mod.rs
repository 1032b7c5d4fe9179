mod action;
mod token;

pub use action::ApiAction;
pub use token::{TOKEN_CHARSET, TOKEN_LENGTH, Token, TokenSubmission};
