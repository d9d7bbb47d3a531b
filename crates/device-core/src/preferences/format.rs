//! Persisted preference list grammar
//!
//! Current format (`*_list2` keys):
//!
//! ```text
//! list   = "[\"" entry *( "\", \"" entry ) "\"]"
//! entry  = "name:" name " uid:" uids
//! uids   = uid *( ";" uid )
//! ```
//!
//! The name is everything up to the last `" uid:"` of the entry, so names may
//! themselves contain spaces. An empty list is written as `[""]`.
//!
//! Legacy format (`*_list` keys, read once for migration) has the same outer
//! shape, but each entry is a bare device name.
//!
//! Strings that do not have the bracket/quote shape are not an error: they
//! parse to `None` and the caller treats them as "no stored preference".

/// Opening delimiter of a persisted list
const LIST_OPEN: &str = "[\"";
/// Closing delimiter of a persisted list
const LIST_CLOSE: &str = "\"]";
/// Separator between entries
const ENTRY_SEPARATOR: &str = "\", \"";
const NAME_TAG: &str = "name:";
const UID_TAG: &str = " uid:";
const UID_SEPARATOR: &str = ";";

/// One parsed current-format entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceEntry {
    pub name: String,
    pub uids: Vec<String>,
}

/// Strip the list delimiters and split into raw entries
fn split_list(value: &str) -> Option<Vec<&str>> {
    // "[\"" and "\"]" may not overlap
    if value.len() < LIST_OPEN.len() + LIST_CLOSE.len()
        || !value.starts_with(LIST_OPEN)
        || !value.ends_with(LIST_CLOSE)
    {
        return None;
    }

    let inner = &value[LIST_OPEN.len()..value.len() - LIST_CLOSE.len()];
    Some(inner.split(ENTRY_SEPARATOR).collect())
}

/// Parse one `name:<name> uid:<uids>` entry. Both parts must be non-empty.
fn parse_entry(entry: &str) -> Option<PreferenceEntry> {
    for (name_at, _) in entry.match_indices(NAME_TAG) {
        let rest = &entry[name_at + NAME_TAG.len()..];

        // The name is greedy: take the last " uid:" that leaves a non-empty
        // name and a non-empty UID part.
        let split = rest
            .rmatch_indices(UID_TAG)
            .map(|(at, _)| at)
            .find(|&at| at > 0 && at + UID_TAG.len() < rest.len());

        if let Some(at) = split {
            let name = &rest[..at];
            let raw_uids = &rest[at + UID_TAG.len()..];

            let mut uids: Vec<String> = Vec::new();
            for uid in raw_uids.replace(['[', ']'], "").split(UID_SEPARATOR) {
                if !uid.is_empty() && !uids.iter().any(|known| known == uid) {
                    uids.push(uid.to_string());
                }
            }

            return Some(PreferenceEntry {
                name: name.to_string(),
                uids,
            });
        }
    }

    None
}

/// Parse a current-format list. Entries that do not match the entry grammar
/// are skipped; `None` means the string is not a list at all.
pub fn parse_current(value: &str) -> Option<Vec<PreferenceEntry>> {
    let entries = split_list(value)?;
    Some(entries.into_iter().filter_map(parse_entry).collect())
}

/// Parse a legacy list of bare names, normalized with
/// [`strip_usb_port_prefix`]. Duplicates are kept; collapsing them is the
/// caller's job since it also decides what to log.
pub fn parse_legacy(value: &str) -> Option<Vec<String>> {
    let entries = split_list(value)?;
    Some(
        entries
            .into_iter()
            .filter(|entry| !entry.is_empty())
            .map(strip_usb_port_prefix)
            .collect(),
    )
}

/// Old WASAPI names embedded the USB port number, e.g.
/// `"Microphone (2- USB Headset)"`. Rewrites every `"(<digits>- "` to `"("`.
pub fn strip_usb_port_prefix(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(open) = rest.find('(') {
        out.push_str(&rest[..=open]);
        let after = &rest[open + 1..];

        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && after[digits..].starts_with("- ") {
            rest = &after[digits + 2..];
        } else {
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

/// Serialize `(name, uids)` pairs in rank order to the current format
pub fn serialize<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let body: Vec<String> = entries
        .into_iter()
        .map(|(name, uids)| format!("{}{}{}{}", NAME_TAG, name, UID_TAG, uids))
        .collect();

    format!("{}{}{}", LIST_OPEN, body.join(ENTRY_SEPARATOR), LIST_CLOSE)
}

/// Join a UID list with the persisted separator
pub fn join_uids(uids: &[String]) -> String {
    uids.join(UID_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, uids: &[&str]) -> PreferenceEntry {
        PreferenceEntry {
            name: name.to_string(),
            uids: uids.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_current_format() {
        let parsed = parse_current(r#"["name:Headset uid:u2;u1", "name:Built-in Microphone uid:1234"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![entry("Headset", &["u2", "u1"]), entry("Built-in Microphone", &["1234"])]
        );
    }

    #[test]
    fn test_parse_name_containing_uid_tag() {
        // The last " uid:" splits, like a greedy match would
        let parsed = parse_current(r#"["name:Odd uid: name uid:u1"]"#).unwrap();
        assert_eq!(parsed, vec![entry("Odd uid: name", &["u1"])]);
    }

    #[test]
    fn test_parse_strips_brackets_and_duplicate_uids() {
        let parsed = parse_current(r#"["name:Mic uid:[a;b;a;;c]"]"#).unwrap();
        assert_eq!(parsed, vec![entry("Mic", &["a", "b", "c"])]);
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let parsed = parse_current(r#"["garbage", "name:Mic uid:u1", "name: uid:x", "name:NoUid uid:"]"#).unwrap();
        assert_eq!(parsed, vec![entry("Mic", &["u1"])]);
    }

    #[test]
    fn test_malformed_lists_are_not_lists() {
        assert!(parse_current("").is_none());
        assert!(parse_current("name:Mic uid:u1").is_none());
        assert!(parse_current(r#"["name:Mic uid:u1""#).is_none());
        assert!(parse_current(r#"["]"#).is_none());
        assert!(parse_legacy("[Mic]").is_none());
    }

    #[test]
    fn test_empty_list_round_trip() {
        let empty = serialize(std::iter::empty());
        assert_eq!(empty, r#"[""]"#);
        assert_eq!(parse_current(&empty).unwrap(), vec![]);
    }

    #[test]
    fn test_serialize_current_format() {
        let value = serialize(vec![
            ("Headset", join_uids(&["u2".to_string(), "u1".to_string()])),
            ("Speakers", "1234".to_string()),
        ]);
        assert_eq!(value, r#"["name:Headset uid:u2;u1", "name:Speakers uid:1234"]"#);
    }

    #[test]
    fn test_parse_legacy() {
        let parsed = parse_legacy(r#"["DeviceA", "Microphone (2- USB Headset)", "DeviceA"]"#).unwrap();
        assert_eq!(parsed, vec!["DeviceA", "Microphone (USB Headset)", "DeviceA"]);
    }

    #[test]
    fn test_strip_usb_port_prefix() {
        assert_eq!(strip_usb_port_prefix("Speakers (12- Jabra)"), "Speakers (Jabra)");
        assert_eq!(strip_usb_port_prefix("A (1- B) (22- C)"), "A (B) (C)");
        assert_eq!(strip_usb_port_prefix("Mic (2-B)"), "Mic (2-B)");
        assert_eq!(strip_usb_port_prefix("Mic (- B)"), "Mic (- B)");
        assert_eq!(strip_usb_port_prefix("Plain"), "Plain");
    }
}
