use nutype::nutype;

/// Longest key accepted, in characters.
pub const MAX_KEY_LEN: usize = 100;

/// Whether `key` may name a setting once normalized.
///
/// Storage backends that map keys onto file names rely on this to rule out
/// path separators and hidden entries.
pub fn is_valid_key(key: &str) -> bool {
    !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// The name of a setting, trimmed and upper-cased.
///
/// ```rust
/// use toy_settings::SettingKey;
///
/// let key = SettingKey::try_new("  feature_flag ").unwrap();
/// assert_eq!(key.as_ref(), "FEATURE_FLAG");
/// assert!(SettingKey::try_new("../etc").is_err());
/// ```
#[nutype(
    sanitize(trim, uppercase),
    validate(not_empty, len_char_max = MAX_KEY_LEN, predicate = is_valid_key),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct SettingKey(String);
