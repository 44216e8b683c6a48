//! MQTT topic filter matching.

/// Check whether `topic` matches the MQTT filter `filter`.
///
/// `+` matches exactly one level, `#` matches the remaining levels
/// (including none).
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) | (None, None) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            _ => return false,
        }
    }
}
