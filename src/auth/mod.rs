//! Authentication: tokens, password hashing, and the channel grant policy

mod password;
mod policy;
mod tokens;

pub use password::{hash_password, verify_password, PasswordError};
pub use policy::{channel_names, channels_for, ChannelGrant, Role};
pub use tokens::{AccessClaims, RefreshClaims, TokenConfig, TokenError, TokenService};
