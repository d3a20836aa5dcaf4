//! Slot extraction module.
//!
//! Rule-based extraction of typed slots from a question: time range, IP
//! literals, severity, user, host, file path, a result limit and the free
//! keywords left over once those spans are removed. Every slot goes through
//! the schema on insert; a value the schema rejects is logged and dropped.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use siemq_core::{fields, SchemaRegistry, Severity, SlotSet, SlotValue, TimeRange};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::REFERENTIAL_WORDS;
use crate::error::Result;
use crate::intent::is_trigger_word;
use crate::SlotExtractor;

lazy_static! {
    static ref RE_LAST_N_UNITS: Regex = Regex::new(
        r"(?i)\b(?:last|past|previous)\s+(\d{1,6})\s+(minutes?|mins?|hours?|hrs?|days?|weeks?|months?)\b"
    )
    .unwrap();
    static ref RE_LAST_UNIT: Regex =
        Regex::new(r"(?i)\b(?:last|past|previous)\s+(minute|hour|day|week|month)\b").unwrap();
    static ref RE_TODAY: Regex = Regex::new(r"(?i)\btoday\b").unwrap();
    static ref RE_YESTERDAY: Regex = Regex::new(r"(?i)\byesterday\b").unwrap();
    static ref RE_THIS_WEEK: Regex = Regex::new(r"(?i)\bthis\s+week\b").unwrap();
    static ref RE_ALL_TIME: Regex = Regex::new(r"(?i)\ball\s+time\b").unwrap();

    static ref RE_IPV4: Regex =
        Regex::new(r"\b(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\b").unwrap();
    static ref RE_SEVERITY: Regex = Regex::new(r"(?i)\b(low|medium|high|critical)\b").unwrap();
    static ref RE_LIMIT: Regex = Regex::new(r"(?i)\b(?:last|top|first|latest)\s+(\d{1,4})\b").unwrap();
    static ref RE_TOKEN: Regex = Regex::new(r"[\w@./\\-]+(?:['’]\w+)*").unwrap();

    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "the", "show", "me", "my", "all", "any", "find", "get", "list", "display",
        "give", "what", "which", "who", "where", "when", "how", "why", "are", "is", "was", "were",
        "be", "been", "there", "in", "on", "at", "of", "for", "from", "to", "by", "with", "about",
        "and", "or", "not", "no", "last", "past", "previous", "minute", "minutes", "hour",
        "hours", "day", "days", "week", "weeks", "month", "months", "today", "yesterday",
        "this", "that", "it", "its", "events", "event", "alerts", "alert", "logs", "log",
        "details", "detail", "please", "can", "could", "you", "i", "we", "our", "some", "did",
        "do", "does", "have", "has", "had", "since", "during", "over", "into", "than", "then",
        "ip", "ips", "address", "addresses", "severity", "level", "user", "users", "username",
        "host", "hosts", "hostname", "agent", "only", "just", "recent", "latest", "top", "first",
        "time", "attempts", "attempt", "activity", "entries", "entry", "results", "result",
        "happened", "occurred", "related", "towards", "destination", "dst", "source", "src",
        "many", "much", "count", "number", "lets", "let", "see", "look", "check",
    ]
    .into_iter()
    .collect();
}

/// Words that introduce a user name.
const USER_MARKERS: &[&str] = &["user", "username", "by"];
/// Words that introduce a host name.
const HOST_MARKERS: &[&str] = &["host", "hostname", "agent"];
/// Words that mark the following IP as the destination.
const DESTINATION_MARKERS: &[&str] = &["to", "towards", "destination", "dst"];

/// Furthest back a relative time phrase may reach unless configured otherwise.
pub const DEFAULT_MAX_LOOKBACK_DAYS: i64 = 365;

/// Rule-based [`SlotExtractor`].
#[derive(Debug, Clone)]
pub struct RuleBasedExtractor {
    schema: Arc<SchemaRegistry>,
    max_lookback: Duration,
}

impl RuleBasedExtractor {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            schema,
            max_lookback: Duration::days(DEFAULT_MAX_LOOKBACK_DAYS),
        }
    }

    /// Caps relative phrases such as "last 40 months" at `max`.
    pub fn with_max_lookback(mut self, max: Duration) -> Self {
        self.max_lookback = max.max(Duration::minutes(1));
        self
    }

    fn insert(&self, slots: &mut SlotSet, field: &str, value: SlotValue) {
        if let Err(e) = slots.insert(&self.schema, field, value) {
            warn!(field, error = %e, "Dropping invalid slot");
        }
    }

    fn extract_ips(&self, text: &str, slots: &mut SlotSet, consumed: &mut Spans) {
        for caps in RE_IPV4.captures_iter(text) {
            let Some(found) = caps.get(0) else {
                continue;
            };
            consumed.push(found.range());

            let ip = match parse_octets(&caps) {
                Some(ip) => ip,
                None => {
                    warn!(value = found.as_str(), "Dropping malformed IP literal");
                    continue;
                }
            };

            let field = if preceded_by_destination(&text[..found.start()]) {
                fields::DESTINATION_IP
            } else {
                fields::SOURCE_IP
            };

            if slots.contains(field) {
                debug!(field, %ip, "Ignoring additional IP for field");
                continue;
            }
            self.insert(slots, field, SlotValue::Ip(ip));
        }
    }
}

impl SlotExtractor for RuleBasedExtractor {
    fn extract(&self, text: &str, now: DateTime<Utc>) -> Result<SlotSet> {
        let mut slots = SlotSet::new();
        let mut consumed = Spans::default();

        let time_spans = time_phrases(text, now, self.max_lookback);
        for (span, _) in &time_spans {
            consumed.push(span.clone());
        }
        if let Some((_, range)) = time_spans.into_iter().next() {
            self.insert(&mut slots, fields::TIMESTAMP, SlotValue::TimeRange(range));
        }

        self.extract_ips(text, &mut slots, &mut consumed);

        if let Some(severity) = extract_severity(text, &mut consumed) {
            self.insert(&mut slots, fields::SEVERITY, SlotValue::Severity(severity));
        }

        slots.limit = extract_limit(text, &mut consumed);

        let tokens = tokenize(text);
        if let Some((user, span)) = name_after(&tokens, USER_MARKERS, &consumed) {
            consumed.push(span);
            self.insert(&mut slots, fields::USER, SlotValue::Text(user));
        }
        if let Some((host, span)) = name_after(&tokens, HOST_MARKERS, &consumed) {
            consumed.push(span);
            self.insert(&mut slots, fields::HOST, SlotValue::Text(host));
        }
        if let Some(path) = tokens
            .iter()
            .find(|t| t.text.starts_with('/') && t.text.len() > 1 && !consumed.overlaps(t.span()))
        {
            consumed.push(path.span());
            self.insert(&mut slots, fields::FILE_PATH, SlotValue::text(path.text));
        }

        slots.keywords = keywords(&tokens, &consumed);

        debug!(
            slots = slots.len(),
            keywords = slots.keywords.len(),
            limit = ?slots.limit,
            "Extracted slots"
        );
        Ok(slots)
    }
}

/// Byte ranges of the question already claimed by a slot.
#[derive(Debug, Default)]
struct Spans(Vec<Range<usize>>);

impl Spans {
    fn push(&mut self, span: Range<usize>) {
        self.0.push(span);
    }

    fn overlaps(&self, span: Range<usize>) -> bool {
        self.0.iter().any(|s| s.start < span.end && span.start < s.end)
    }
}

#[derive(Debug)]
struct Token<'a> {
    text: &'a str,
    lower: String,
    start: usize,
}

impl Token<'_> {
    fn span(&self) -> Range<usize> {
        self.start..self.start + self.text.len()
    }
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    RE_TOKEN
        .find_iter(text)
        .filter_map(|found| {
            let raw = found.as_str();
            let head = raw.trim_start_matches(['.', '-']);
            let trimmed = head.trim_end_matches(['.', '-']);
            if trimmed.is_empty() {
                return None;
            }
            Some(Token {
                text: trimmed,
                lower: trimmed.to_lowercase(),
                start: found.start() + (raw.len() - head.len()),
            })
        })
        .collect()
}

/// Every recognised time phrase with its span, earliest first.
fn time_phrases(
    text: &str,
    now: DateTime<Utc>,
    max_lookback: Duration,
) -> Vec<(Range<usize>, TimeRange)> {
    let mut found: Vec<(Range<usize>, TimeRange)> = Vec::new();

    for caps in RE_LAST_N_UNITS.captures_iter(text) {
        let (Some(whole), Some(n), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Ok(n) = n.as_str().parse::<i64>() else {
            continue;
        };
        if n == 0 {
            continue;
        }
        if let Some(range) =
            unit_span(unit.as_str(), n).and_then(|span| lookback(now, span, max_lookback))
        {
            found.push((whole.range(), range));
        }
    }

    for caps in RE_LAST_UNIT.captures_iter(text) {
        let (Some(whole), Some(unit)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(range) =
            unit_span(unit.as_str(), 1).and_then(|span| lookback(now, span, max_lookback))
        {
            found.push((whole.range(), range));
        }
    }

    let today = start_of_day(now);
    for m in RE_TODAY.find_iter(text) {
        found.push((m.range(), TimeRange::between(today, now)));
    }
    for m in RE_YESTERDAY.find_iter(text) {
        found.push((m.range(), TimeRange::between(today - Duration::days(1), today)));
    }
    for m in RE_THIS_WEEK.find_iter(text) {
        let monday = today - Duration::days(i64::from(now.weekday().num_days_from_monday()));
        found.push((m.range(), TimeRange::between(monday, now)));
    }
    for m in RE_ALL_TIME.find_iter(text) {
        found.push((m.range(), TimeRange::all_time(now)));
    }

    found.sort_by_key(|(span, _)| span.start);
    found
}

fn unit_span(unit: &str, n: i64) -> Option<Duration> {
    let unit = unit.to_ascii_lowercase();
    let span = match unit.trim_end_matches('s') {
        "minute" | "min" => Duration::minutes(n),
        "hour" | "hr" => Duration::hours(n),
        "day" => Duration::days(n),
        "week" => Duration::weeks(n),
        "month" => Duration::days(30 * n),
        _ => return None,
    };
    Some(span)
}

fn lookback(now: DateTime<Utc>, span: Duration, max: Duration) -> Option<TimeRange> {
    if span > max {
        debug!(requested_days = span.num_days(), max_days = max.num_days(), "Capping lookback");
    }
    now.checked_sub_signed(span.min(max))
        .map(|start| TimeRange::between(start, now))
}

/// Octets are read as decimal, so "010" is 10.
fn parse_octets(caps: &regex::Captures<'_>) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    let [a, b, c, d] = octets;
    Some(Ipv4Addr::new(a, b, c, d))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

fn preceded_by_destination(before: &str) -> bool {
    let mut words = before
        .split_whitespace()
        .rev()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase());

    match words.next() {
        Some(word) if DESTINATION_MARKERS.contains(&word.as_str()) => true,
        Some(word) if matches!(word.as_str(), "ip" | "address" | "addr") => words
            .next()
            .map(|w| DESTINATION_MARKERS.contains(&w.as_str()))
            .unwrap_or(false),
        _ => false,
    }
}

/// Most restrictive severity mentioned.
fn extract_severity(text: &str, consumed: &mut Spans) -> Option<Severity> {
    let mut highest: Option<Severity> = None;
    for found in RE_SEVERITY.find_iter(text) {
        consumed.push(found.range());
        let severity = Severity::parse(found.as_str());
        highest = highest.max(severity);
    }
    highest
}

/// "last 5", "top 10" not followed by a time unit.
fn extract_limit(text: &str, consumed: &mut Spans) -> Option<usize> {
    for caps in RE_LIMIT.captures_iter(text) {
        let (Some(whole), Some(n)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if consumed.overlaps(whole.range()) {
            continue;
        }

        let next_word = text[whole.end()..]
            .split_whitespace()
            .next()
            .map(str::to_ascii_lowercase);
        if next_word
            .as_deref()
            .and_then(|w| unit_span(w, 1))
            .is_some()
        {
            continue;
        }

        if let Ok(limit) = n.as_str().parse::<usize>() {
            if limit > 0 {
                consumed.push(whole.range());
                return Some(limit);
            }
        }
    }
    None
}

/// First acceptable name token directly after one of `markers`.
///
/// A possessive marker ("the user's logins") introduces no name.
fn name_after(tokens: &[Token<'_>], markers: &[&str], consumed: &Spans) -> Option<(String, Range<usize>)> {
    tokens.windows(2).find_map(|pair| {
        let (marker, candidate) = (&pair[0], &pair[1]);
        if !markers.contains(&marker.lower.as_str()) {
            return None;
        }
        if consumed.overlaps(candidate.span()) || is_reserved(&candidate.lower) {
            return None;
        }
        let name = strip_possessive(candidate.text);
        Some((name.to_string(), marker.start..candidate.span().end))
    })
}

/// "alice's" -> "alice"
fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("’s"))
        .or_else(|| word.strip_suffix("'S"))
        .unwrap_or(word)
}

fn is_reserved(word: &str) -> bool {
    let word = strip_possessive(word);
    STOP_WORDS.contains(word)
        || REFERENTIAL_WORDS.contains(&word)
        || is_trigger_word(word)
        || Severity::parse(word).is_some()
        || word.parse::<Ipv4Addr>().is_ok()
        || word.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn keywords(tokens: &[Token<'_>], consumed: &Spans) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| !consumed.overlaps(t.span()))
        .map(|t| strip_possessive(&t.lower))
        .filter(|word| word.chars().count() >= 3 && !is_reserved(word))
        .filter(|word| seen.insert(word.to_string()))
        .map(str::to_string)
        .collect()
}
