//! Core identifier types
//!
//! Every cached entity is keyed by a `MicroblogKey`: the backend's own ID
//! qualified by the instance host it came from. IDs are only unique within
//! one backend instance, so the host is part of the key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Composite key `(id, host)` unique within a backend instance.
///
/// Rendered as `id@host`. The ID may itself contain `@` (AT-URIs do), so
/// parsing splits on the last `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MicroblogKey {
    pub id: String,
    pub host: String,
}

impl MicroblogKey {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for MicroblogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.host)
    }
}

impl FromStr for MicroblogKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, host) = s.rsplit_once('@').ok_or(InvalidKey)?;
        if id.is_empty() || host.is_empty() {
            return Err(InvalidKey);
        }
        Ok(Self {
            id: id.to_string(),
            host: host.to_string(),
        })
    }
}

/// Error parsing a `MicroblogKey` from its `id@host` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid microblog key, expected id@host")]
pub struct InvalidKey;

/// The account a row was fetched under. Same shape as `MicroblogKey`,
/// aliased for readability at call sites.
pub type AccountKey = MicroblogKey;

/// Which backend protocol an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformType {
    Mastodon,
    Misskey,
    Bluesky,
    Xqt,
    Vvo,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mastodon => "mastodon",
            Self::Misskey => "misskey",
            Self::Bluesky => "bluesky",
            Self::Xqt => "xqt",
            Self::Vvo => "vvo",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformType {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mastodon" => Ok(Self::Mastodon),
            "misskey" => Ok(Self::Misskey),
            "bluesky" => Ok(Self::Bluesky),
            "xqt" => Ok(Self::Xqt),
            "vvo" => Ok(Self::Vvo),
            _ => Err(InvalidKey),
        }
    }
}

/// Well-known paging-key builders.
///
/// One logical feed = one paging key. Keys embed the account so two
/// accounts on the same instance never share entries.
pub mod paging_key {
    use super::{AccountKey, MicroblogKey};

    pub fn home(account: &AccountKey) -> String {
        format!("home_{account}")
    }

    pub fn local(account: &AccountKey) -> String {
        format!("local_{account}")
    }

    pub fn public(account: &AccountKey) -> String {
        format!("public_{account}")
    }

    pub fn notification(account: &AccountKey) -> String {
        format!("notification_{account}")
    }

    pub fn mention(account: &AccountKey) -> String {
        format!("mention_{account}")
    }

    pub fn user_timeline(account: &AccountKey, user: &MicroblogKey) -> String {
        format!("user_{user}_{account}")
    }

    pub fn search(account: &AccountKey, query: &str) -> String {
        format!("search_{query}_{account}")
    }

    pub fn status_detail(account: &AccountKey, status: &MicroblogKey) -> String {
        format!("status_detail_{status}_{account}")
    }

    pub fn list_timeline(account: &AccountKey, list_id: &str) -> String {
        format!("list_timeline_{list_id}_{account}")
    }

    pub fn bookmarks(account: &AccountKey) -> String {
        format!("bookmarked_{account}")
    }

    pub fn favourites(account: &AccountKey) -> String {
        format!("favourite_{account}")
    }

    pub fn lists(account: &AccountKey) -> String {
        format!("lists_{account}")
    }

    pub fn message_rooms(account: &AccountKey) -> String {
        format!("message_rooms_{account}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrips_through_display() {
        let key = MicroblogKey::new("123", "mastodon.social");
        let parsed: MicroblogKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn key_with_at_in_id_splits_on_last_at() {
        let parsed: MicroblogKey = "at://did:plc:abc/app.bsky.feed.post/3k@bsky.social"
            .parse()
            .unwrap();
        assert_eq!(parsed.id, "at://did:plc:abc/app.bsky.feed.post/3k");
        assert_eq!(parsed.host, "bsky.social");
    }

    #[test]
    fn rejects_missing_host() {
        assert!("noat".parse::<MicroblogKey>().is_err());
        assert!("trailing@".parse::<MicroblogKey>().is_err());
    }

    #[test]
    fn platform_type_roundtrips() {
        for p in [
            PlatformType::Mastodon,
            PlatformType::Misskey,
            PlatformType::Bluesky,
            PlatformType::Xqt,
            PlatformType::Vvo,
        ] {
            assert_eq!(p.as_str().parse::<PlatformType>().unwrap(), p);
        }
    }
}
