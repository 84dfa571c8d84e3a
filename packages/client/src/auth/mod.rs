//! Authentication against an OpenID Connect identity provider.

pub mod callback;
pub mod navigator;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod store;

pub use callback::{CallbackListener, spawn_callback_listener};
pub use navigator::{ConsoleNavigator, Navigator};
pub use provider::{IdentityProvider, OidcProvider, TokenResponse, UserInfo};
pub use session::{CallbackParams, CompletedLogin, SessionManager, SessionOptions};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
