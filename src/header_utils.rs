//! Parsing helpers for HTTP-date strings and comma-joined `Cache-Control`
//! style header values.
//!
//! Nothing here ever returns an `Err`: an unparsable date or a malformed
//! `directive=seconds` token is "absence", and callers treat it exactly like
//! a missing header (`spec.md §7`).

use http::HeaderMap;
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

const RFC1123_EMIT: &[time::format_description::FormatItem<'static>] =
    format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );

/// Parses an HTTP-date, trying RFC 1123, RFC 850, ANSI C `asctime`, and
/// RFC 5322 in turn, per `spec.md §4.1`. Leading/trailing whitespace is
/// ignored; UTC is assumed whenever a form carries no explicit zone.
///
/// RFC 1123 dates (`Sun, 06 Nov 1994 08:49:37 GMT`) are syntactically a
/// degenerate case of RFC 5322, so both are parsed by the same
/// [`Rfc2822`]-based attempt below; the RFC 850 and `asctime` forms are
/// hand-parsed since neither is expressible as a single `time` well-known
/// format (RFC 850's two-digit year needs the century-inference rule this
/// module applies explicitly).
pub fn try_parse_date(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Some(dt);
    }
    if let Some(dt) = parse_rfc850(s) {
        return Some(dt);
    }
    if let Some(dt) = parse_asctime(s) {
        return Some(dt);
    }
    None
}

/// Formats a timestamp the way this component always emits dates: RFC 1123,
/// in GMT, regardless of the input's original offset.
pub fn format_http_date(dt: OffsetDateTime) -> String {
    dt.to_offset(time::UtcOffset::UTC)
        .format(RFC1123_EMIT)
        .expect("RFC1123_EMIT is a valid static format")
}

/// `Sunday, 06-Nov-94 08:49:37 GMT`
fn parse_rfc850(s: &str) -> Option<OffsetDateTime> {
    let (_weekday, rest) = s.split_once(", ")?;
    let mut parts = rest.split_whitespace();
    let date_part = parts.next()?;
    let time_part = parts.next()?;
    // trailing zone token (GMT) is ignored; UTC is assumed.

    let mut date_fields = date_part.split('-');
    let day: u8 = date_fields.next()?.parse().ok()?;
    let month = parse_month_short(date_fields.next()?)?;
    let year_two: u32 = date_fields.next()?.parse().ok()?;
    if date_fields.next().is_some() {
        return None;
    }
    let year = if year_two < 70 { 2000 + year_two } else { 1900 + year_two } as i32;

    let (hour, minute, second) = parse_hms(time_part)?;
    build_utc(year, month, day, hour, minute, second)
}

/// `Sun Nov  6 08:49:37 1994` (day-of-month may be space-padded).
fn parse_asctime(s: &str) -> Option<OffsetDateTime> {
    let mut parts = s.split_whitespace();
    let _weekday = parts.next()?;
    let month = parse_month_short(parts.next()?)?;
    let day: u8 = parts.next()?.parse().ok()?;
    let time_part = parts.next()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let (hour, minute, second) = parse_hms(time_part)?;
    build_utc(year, month, day, hour, minute, second)
}

fn parse_hms(s: &str) -> Option<(u8, u8, u8)> {
    let mut fields = s.split(':');
    let hour: u8 = fields.next()?.parse().ok()?;
    let minute: u8 = fields.next()?.parse().ok()?;
    let second: u8 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((hour, minute, second))
}

fn build_utc(
    year: i32,
    month: Month,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Option<OffsetDateTime> {
    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

fn parse_month_short(s: &str) -> Option<Month> {
    Some(match s.to_ascii_lowercase().as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    })
}

/// Finds `directive=seconds` across a set of comma-joined header values and
/// parses the first match, per `spec.md §4.1`.
///
/// `directive` is matched as a plain substring, not a token — searching for
/// `max-age` will match inside `fresh-max-age`. This is a known, preserved
/// quirk (`spec.md §9` open question), not a bug.
pub fn try_parse_time_span<'a, I>(values: I, directive: &str) -> Option<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    let directive_lower = directive.to_ascii_lowercase();
    for value in values {
        let lower = value.to_ascii_lowercase();
        let Some(pos) = lower.find(&directive_lower) else {
            continue;
        };
        let rest = &value[pos + directive.len()..];
        let rest = rest.trim_start_matches(' ');
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start_matches(' ');
        let digits: String =
            rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        if let Ok(seconds) = digits.parse::<u64>() {
            return Some(seconds);
        }
    }
    None
}

/// All values of `name` in `headers`, as `&str`, skipping any that are not
/// valid UTF-8 — the one shared way every predicate and orchestration step
/// in this crate reads a (possibly multi-valued) header.
pub fn header_values<'a>(headers: &'a HeaderMap, name: &str) -> Vec<&'a str> {
    headers.get_all(name).iter().filter_map(|v| v.to_str().ok()).collect()
}

/// Case-insensitive substring test across any of `values`.
pub fn contains<'a, I>(values: I, token: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let token_lower = token.to_ascii_lowercase();
    values.into_iter().any(|v| v.to_ascii_lowercase().contains(&token_lower))
}
