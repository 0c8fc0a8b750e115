//! UUID-backed identifiers for users, channels, assets, tokens and jobs.
//!
//! Each entity gets its own newtype so a `ChannelId` cannot be passed where
//! an `AssetId` is expected. IDs are persisted as hyphenated UUID text.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

macro_rules! entity_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(Uuid);

            impl $name {
                /// Fresh random (v4) ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.hyphenated().fmt(f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }
        )+
    };
}

entity_id! {
    /// An uploaded video asset.
    AssetId,
    /// A channel, the owner of assets.
    ChannelId,
    /// An account that can hold a channel and bearer tokens.
    UserId,
    /// A bearer token record.
    SessionId,
    /// A deferred finalize job.
    JobId,
}

impl UserId {
    /// Acts for requests when auth is disabled or the API key is presented.
    pub const ANONYMOUS: UserId = UserId(Uuid::nil());
}
