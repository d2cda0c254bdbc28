pub mod action_token;
pub mod authorization;
pub mod lockout;
pub mod mailer;
pub mod password;
pub mod session;
pub mod validation;

pub use action_token::ActionTokenKind;
pub use authorization::{Authorizer, Decision, MembershipLookup, Scope};
pub use lockout::{LockoutPolicy, LockoutState};
pub use mailer::{ActionEmail, LogMailer, Mailer, WebhookMailer};
pub use password::PasswordHasher;
pub use session::{IssuedSession, SessionError, SessionTokens};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, LoginResult, NewUser, UserInfo};
pub use auth_service_impl::SeaOrmAuthService;

pub mod membership_service;
pub mod membership_service_impl;
pub use membership_service::MembershipService;
pub use membership_service_impl::SeaOrmMembershipService;
