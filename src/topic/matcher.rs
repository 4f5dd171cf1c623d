//! Topic filter matching
//!
//! Matching rules:
//! - / is the level separator
//! - + matches exactly one level
//! - # matches the rest of the topic, wherever it appears in the filter
//!
//! `#` is accepted at any position, not only as the last level. A filter
//! such as `a/#/c` therefore matches every topic under `a`. No special
//! treatment is given to topics starting with `$`.

/// Check if a topic filter matches a topic name
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if filter == "#" {
        return true;
    }

    let mut topic_levels = topic.split('/');

    for filter_level in filter.split('/') {
        if filter_level == "#" {
            // # consumes everything remaining
            return true;
        }

        let Some(topic_level) = topic_levels.next() else {
            // Filter has more non-# levels than the topic
            return false;
        };

        if filter_level != "+" && filter_level != topic_level {
            return false;
        }
    }

    // Both must be exhausted for a match
    topic_levels.next().is_none()
}
