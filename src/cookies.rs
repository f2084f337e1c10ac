// 🍪 Cookie Protocol - A visitor's ratings, carried in one cookie value
//
// Wire format (one record per rated cat, no outer wrapping):
//
//     <id>#<rating>#_<id>#<rating>#_...
//
// - id:     decimal digits
// - rating: decimal with one fractional digit ("3.4", "0.0", "5.0")
//
// Records are always written in that form. When reading, a third field
// between the second '#' and the '_' is tolerated and percent-decoded.
//
// Client-supplied values are parsed leniently: anything that doesn't match
// the grammar is skipped, never an error.

use crate::entities::{Cat, Opinion};
use tracing::debug;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Separates the fields of one record
pub const FIELD_SEPARATOR: char = '#';

/// Ends one record
pub const CAT_TERMINATOR: char = '_';

/// Name of the cookie holding the encoded ratings
pub const COOKIE_NAME: &str = "catList";

// ============================================================================
// RESPONSE WRITER
// ============================================================================

/// Whatever sets cookies on the outgoing response.
///
/// Expiry, path and security flags are the writer's business.
pub trait CookieWriter {
    fn add_cookie(&mut self, name: &str, value: &str);
}

/// Collects cookies instead of sending them (tests, CLI)
impl CookieWriter for Vec<(String, String)> {
    fn add_cookie(&mut self, name: &str, value: &str) {
        self.push((name.to_string(), value.to_string()));
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One parsed record
#[derive(Debug, Clone, PartialEq)]
pub struct CookieRecord {
    pub id: u64,
    pub stars: f64,
    pub comment: String,

    /// Record text through the second field separator ("0#3.4#")
    pub value: String,
}

impl CookieRecord {
    pub fn to_opinion(&self) -> Opinion {
        Opinion::new(self.stars, self.comment.clone())
    }
}

/// Render one record, terminator included ("0#3.4#_")
pub fn format_record(id: u64, stars: f64) -> String {
    format!("{id}{FIELD_SEPARATOR}{stars:.1}{FIELD_SEPARATOR}{CAT_TERMINATOR}")
}

/// Split a cookie value into well-formed records, in order.
///
/// Records are delimited by the terminator first, then split into fields, so
/// an id is only ever matched at a record boundary.
pub fn parse_records(cookie: &str) -> Vec<CookieRecord> {
    let mut records = Vec::new();
    let mut rest = cookie;

    while let Some(end) = rest.find(CAT_TERMINATOR) {
        let raw = &rest[..end];
        rest = &rest[end + CAT_TERMINATOR.len_utf8()..];

        match parse_record(raw) {
            Some(record) => records.push(record),
            None => debug!(fragment = raw, "Skipping malformed cookie record"),
        }
    }

    if !rest.is_empty() {
        debug!(fragment = rest, "Skipping unterminated cookie record");
    }

    records
}

fn parse_record(raw: &str) -> Option<CookieRecord> {
    let mut fields = raw.splitn(3, FIELD_SEPARATOR);
    let id_field = fields.next()?;
    let stars_field = fields.next()?;
    let comment_field = fields.next()?;

    if comment_field.contains(FIELD_SEPARATOR) {
        return None;
    }

    if id_field.is_empty() || !id_field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // f64::from_str also takes "inf", "NaN" and exponents; the grammar doesn't
    if stars_field.is_empty() || !stars_field.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }

    let id = id_field.parse::<u64>().ok()?;
    let stars = stars_field.parse::<f64>().ok()?;
    let comment = urlencoding::decode(comment_field).ok()?.into_owned();

    let value_len = id_field.len() + stars_field.len() + 2 * FIELD_SEPARATOR.len_utf8();

    Some(CookieRecord {
        id,
        stars,
        comment,
        value: raw[..value_len].to_string(),
    })
}

// ============================================================================
// QUERIES
// ============================================================================

/// Does the cookie hold a record for this cat?
pub fn is_entry_in_cookies(cat: &Cat, cookie: &str) -> bool {
    parse_records(cookie).iter().any(|record| record.id == cat.id)
}

/// First record for this cat, through its second separator ("0#3.4#")
pub fn value_for_entry(cat: &Cat, cookie: &str) -> Option<String> {
    parse_records(cookie)
        .into_iter()
        .find(|record| record.id == cat.id)
        .map(|record| record.value)
}

/// Value equality between a recorded opinion and a (stars, comment) pair
pub fn is_opinion_in_cookies(opinion: &Opinion, stars: f64, comment: &str) -> bool {
    opinion.stars() == stars && opinion.comment() == comment
}

/// Opinions the cookie implies for this cat, without duplicates
pub fn update_opinions_with_cookie_value(cat: &Cat, cookie: &str) -> Vec<Opinion> {
    let mut opinions: Vec<Opinion> = Vec::new();

    for record in parse_records(cookie).into_iter().filter(|r| r.id == cat.id) {
        let seen = opinions
            .iter()
            .any(|o| is_opinion_in_cookies(o, record.stars, &record.comment));
        if !seen {
            opinions.push(record.to_opinion());
        }
    }

    opinions
}

// ============================================================================
// UPDATE
// ============================================================================

/// Replace this cat's record with a fresh one and hand the result to `writer`.
///
/// Records for other cats keep their order and their id/rating text; any
/// third field is dropped, as are malformed fragments. The comment stays with the cat's opinions and
/// is not written into the cookie.
pub fn update_cookies<W: CookieWriter + ?Sized>(
    old_cookie: &str,
    id: u64,
    average_stars: f64,
    _comment: &str,
    writer: &mut W,
) -> String {
    let mut value = String::with_capacity(old_cookie.len() + 16);

    for record in parse_records(old_cookie).iter().filter(|r| r.id != id) {
        value.push_str(&record.value);
        value.push(CAT_TERMINATOR);
    }
    value.push_str(&format_record(id, average_stars));

    writer.add_cookie(COOKIE_NAME, &value);
    value
}

// ============================================================================
// HTTP HELPERS
// ============================================================================

/// Pull one cookie out of a `Cookie:` header value
pub fn cookie_from_header<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DUMMY_COOKIE: &str = "0#0.0#_";
    const EXAMPLE_COOKIE: &str = "0#3.4#_22#3.4#_";
    const EXAMPLE_COOKIE_2: &str = "22#3.4#_11#3.5#_";

    fn dummy() -> Cat {
        Cat::new("dummy", "dummy.png")
    }

    #[test]
    fn test_update_cookies() {
        let mut writer: Vec<(String, String)> = Vec::new();

        let cookies = update_cookies("", 0, 0.0, "", &mut writer);

        assert!(cookies.contains(FIELD_SEPARATOR));
        assert!(cookies.contains(CAT_TERMINATOR));
        assert_eq!(cookies, "0#0.0#_");
        assert_eq!(writer, vec![(COOKIE_NAME.to_string(), cookies)]);
    }

    #[test]
    fn test_cat_in_cookies() {
        assert!(is_entry_in_cookies(&dummy(), DUMMY_COOKIE));
    }

    #[test]
    fn test_cat_in_empty_cookies() {
        assert!(!is_entry_in_cookies(&dummy(), ""));
    }

    #[test]
    fn test_update_opinions_with_cookies() {
        let opinions = update_opinions_with_cookie_value(&dummy(), DUMMY_COOKIE);
        assert!(!opinions.is_empty());
        assert_eq!(opinions[0], Opinion::new(0.0, ""));
    }

    #[test]
    fn test_update_opinions_with_empty_cookies() {
        assert!(update_opinions_with_cookie_value(&dummy(), "").is_empty());
    }

    #[test]
    fn test_update_opinions_with_non_matching_cookies() {
        assert!(update_opinions_with_cookie_value(&dummy(), EXAMPLE_COOKIE_2).is_empty());
    }

    #[test]
    fn test_opinion_in_cookies() {
        let opinion = Opinion::new(3.4, "hola que tal");

        assert!(is_opinion_in_cookies(&opinion, 3.4, "hola que tal"));
        assert!(!is_opinion_in_cookies(&opinion, 0.0, "hola que tal"));
        assert!(!is_opinion_in_cookies(&opinion, 3.4, ""));
    }

    #[test]
    fn test_value_for_cat() {
        let mut cat = Cat::new("carlina", "azula.png");
        cat.rate(3.4, "esto es una prueba");

        assert_eq!(value_for_entry(&cat, EXAMPLE_COOKIE), Some("0#3.4#".to_string()));
        assert_eq!(value_for_entry(&cat, EXAMPLE_COOKIE_2), None);
    }

    #[test]
    fn test_id_only_matches_at_record_boundary() {
        let two = Cat::with_id(2, "Two", "two.png");
        let twenty_two = Cat::with_id(22, "TwentyTwo", "22.png");

        assert!(!is_entry_in_cookies(&two, "22#3.4#_12#1.0#_"));
        assert_eq!(value_for_entry(&two, "22#3.4#_12#1.0#_"), None);
        assert_eq!(
            value_for_entry(&twenty_two, "2#1.0#_22#3.4#_"),
            Some("22#3.4#".to_string())
        );
    }

    #[test]
    fn test_id_compared_as_integer() {
        assert_eq!(value_for_entry(&dummy(), "00#1.5#_"), Some("00#1.5#".to_string()));
    }

    #[test]
    fn test_first_record_wins() {
        assert_eq!(
            value_for_entry(&dummy(), "0#1.0#_0#2.0#_"),
            Some("0#1.0#".to_string())
        );
    }

    #[test]
    fn test_update_replaces_existing_record() {
        let mut writer: Vec<(String, String)> = Vec::new();

        let cookies = update_cookies(EXAMPLE_COOKIE, 0, 4.2, "", &mut writer);

        assert_eq!(cookies, "22#3.4#_0#4.2#_");
        assert_eq!(value_for_entry(&dummy(), &cookies), Some("0#4.2#".to_string()));
    }

    #[test]
    fn test_update_removes_every_record_for_id() {
        let mut writer: Vec<(String, String)> = Vec::new();

        let cookies = update_cookies("0#1.0#_5#2.0#_0#3.0#_", 0, 2.0, "", &mut writer);

        assert_eq!(cookies, "5#2.0#_0#2.0#_");
    }

    #[test]
    fn test_round_trip_returns_written_record() {
        let mut writer: Vec<(String, String)> = Vec::new();
        let cat = Cat::with_id(11, "Milo", "milo.png");

        let cookies = update_cookies(EXAMPLE_COOKIE_2, cat.id, 4.5, "", &mut writer);

        assert_eq!(cookies, "22#3.4#_11#4.5#_");
        assert_eq!(value_for_entry(&cat, &cookies), Some("11#4.5#".to_string()));
    }

    #[test]
    fn test_comment_is_not_written() {
        let mut writer: Vec<(String, String)> = Vec::new();
        let cat = Cat::with_id(3, "Duke", "duke.png");

        let cookies = update_cookies("1#2.0#_", cat.id, 5.0, "best_cat #1 100%", &mut writer);

        assert_eq!(cookies, "1#2.0#_3#5.0#_");
        assert_eq!(update_cookies("", 0, 5.0, "foo bar", &mut writer), "0#5.0#_");
        assert!(cookies
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == FIELD_SEPARATOR || c == CAT_TERMINATOR));
        assert_eq!(
            update_opinions_with_cookie_value(&cat, &cookies),
            vec![Opinion::new(5.0, "")]
        );
    }

    #[test]
    fn test_third_field_is_read_and_dropped_on_rewrite() {
        let mut writer: Vec<(String, String)> = Vec::new();
        let legacy = "1#2.0#foo%20bar_4#1.5#x_";

        let records = parse_records(legacy);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].comment, "foo bar");
        assert_eq!(records[0].value, "1#2.0#");

        let cookies = update_cookies(legacy, 1, 3.0, "", &mut writer);
        assert_eq!(cookies, "4#1.5#_1#3.0#_");
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let garbage = "abc#1.0#_0#x#_7#NaN#_1#2.0_#_3#4.0#_9#1.0";

        let records = parse_records(garbage);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 3);
        assert!(!is_entry_in_cookies(&Cat::with_id(9, "Nine", "9.png"), garbage));
        assert!(update_opinions_with_cookie_value(&dummy(), garbage).is_empty());
    }

    #[test]
    fn test_update_drops_malformed_fragments() {
        let mut writer: Vec<(String, String)> = Vec::new();

        let cookies = update_cookies("junk_4#1.0#_4#2", 0, 3.0, "", &mut writer);

        assert_eq!(cookies, "4#1.0#_0#3.0#_");
    }

    #[test]
    fn test_duplicate_cookie_opinions_collapse() {
        let opinions = update_opinions_with_cookie_value(&dummy(), "0#2.0#_0#2.0#_0#3.0#_");
        assert_eq!(opinions, vec![Opinion::new(2.0, ""), Opinion::new(3.0, "")]);
    }

    #[test]
    fn test_cookie_from_header() {
        let header = "theme=dark; catList=0#3.4#_22#3.4#_; other=1";

        assert_eq!(cookie_from_header(header, COOKIE_NAME), Some(EXAMPLE_COOKIE));
        assert_eq!(cookie_from_header("catList=\"0#1.0#_\"", COOKIE_NAME), Some("0#1.0#_"));
        assert_eq!(cookie_from_header("theme=dark", COOKIE_NAME), None);
    }
}
