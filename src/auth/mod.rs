//! Session bridge between browser callers and the ServiceNow instance.

mod extract;
mod session;
mod signin;

pub use extract::{
    clear_session_cookie, extract_token, session_cookie, Session, SESSION_COOKIE, SESSION_HEADER,
};
pub use session::{
    ActiveSession, SessionError, SessionManager, SessionSigner, SessionUser, TokenClaims,
};
pub use signin::{sign_in, SignInError, SignInMode, SignInRequest};
