//! Normalization mappers
//!
//! Pure wire-to-row translation, one module per backend. Mappers are
//! deterministic and total: an entity missing its ID is skipped, and
//! payload shapes this build does not recognize degrade to the `Unknown`
//! content variant instead of failing the page. No mapper touches the
//! store or the network.

pub mod bluesky;
pub mod mastodon;
pub mod misskey;
pub mod vvo;
pub mod xqt;

use crate::data::CachedEntry;

/// Flatten a reply thread into one explicitly sorted sequence.
///
/// Ancestors receive decreasing negative offsets so they sort above the
/// focal post, the focal post sits at zero, replies follow below it.
pub fn flatten_thread(
    ancestors: Vec<CachedEntry>,
    focal: CachedEntry,
    replies: Vec<CachedEntry>,
) -> Vec<CachedEntry> {
    let depth = ancestors.len() as i64;
    let mut entries = Vec::with_capacity(ancestors.len() + 1 + replies.len());
    for (index, entry) in ancestors.into_iter().enumerate() {
        entries.push(entry.with_sort_offset(index as i64 - depth));
    }
    entries.push(focal.with_sort_offset(0));
    for (index, entry) in replies.into_iter().enumerate() {
        entries.push(entry.with_sort_offset(index as i64 + 1));
    }
    entries
}

/// Strip scripts and event handlers from backend HTML before caching.
pub(crate) fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{StatusContent, StatusRow};
    use crate::model::{MicroblogKey, PlatformType};

    fn entry(id: &str) -> CachedEntry {
        CachedEntry::new(
            StatusRow {
                status_key: MicroblogKey::new(id, "example.test"),
                account_key: MicroblogKey::new("me", "example.test"),
                platform_type: PlatformType::Mastodon,
                user_key: None,
                content: StatusContent::Unknown(serde_json::Value::Null),
            },
            None,
        )
    }

    #[test]
    fn thread_orders_ancestors_focal_replies() {
        let entries = flatten_thread(
            vec![entry("a1"), entry("a2")],
            entry("focal"),
            vec![entry("r1"), entry("r2"), entry("r3")],
        );
        let offsets: Vec<i64> = entries.iter().map(|e| e.sort_offset.unwrap()).collect();
        assert_eq!(offsets, vec![-2, -1, 0, 1, 2, 3]);
        assert_eq!(entries[2].status.status_key.id, "focal");
    }

    #[test]
    fn sanitize_drops_script_tags() {
        let clean = sanitize_html("<p>hi</p><script>alert(1)</script>");
        assert!(clean.contains("<p>hi</p>"));
        assert!(!clean.contains("script"));
    }
}
