//! Core availability checking logic for usernames on Roblox.

use std::fmt;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ureq::Agent;
use url::Url;

use crate::budget::{BudgetExhausted, RateBudget};

/// Username format rules and input sanitization.
///
/// Mirrors the signup-form rules enforced upstream: 3 to 20 characters,
/// ASCII letters, digits, and underscores, with no leading, trailing, or
/// consecutive underscores.
pub mod validation {
    use std::fmt;

    /// Minimum username length accepted upstream.
    pub const MIN_NAME_LENGTH: usize = 3;
    /// Maximum username length accepted upstream.
    pub const MAX_NAME_LENGTH: usize = 20;

    // Words the platform rejects at signup regardless of format.
    const FORBIDDEN_WORDS: &[&str] = &["roblox", "robux", "admin", "moderator"];

    /// Why a candidate failed the username format rules.
    #[derive(Debug)]
    pub enum InvalidUsername {
        /// Shorter than [`MIN_NAME_LENGTH`] characters.
        TooShort {
            /// The rejected candidate.
            name: String,
        },
        /// Longer than [`MAX_NAME_LENGTH`] characters.
        TooLong {
            /// The rejected candidate.
            name: String,
        },
        /// A character outside ASCII letters, digits, and `_`.
        Char {
            /// The offending character.
            ch: char,
            /// The rejected candidate.
            name: String,
        },
        /// Starts or ends with an underscore.
        UnderscoreEdge {
            /// The rejected candidate.
            name: String,
        },
        /// Contains two underscores in a row.
        DoubleUnderscore {
            /// The rejected candidate.
            name: String,
        },
    }

    impl fmt::Display for InvalidUsername {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::TooShort { name } => {
                    write!(
                        f,
                        "username `{name}` is too short (min {MIN_NAME_LENGTH} characters)"
                    )
                }
                Self::TooLong { name } => {
                    write!(
                        f,
                        "username `{name}` is too long (max {MAX_NAME_LENGTH} characters)"
                    )
                }
                Self::Char { ch, name } => {
                    write!(
                        f,
                        "invalid character `{ch}` in username: `{name}`, \
                         characters must be ASCII letters, digits, or `_`"
                    )
                }
                Self::UnderscoreEdge { name } => {
                    write!(
                        f,
                        "username `{name}` cannot start or end with an underscore"
                    )
                }
                Self::DoubleUnderscore { name } => {
                    write!(
                        f,
                        "username `{name}` cannot contain consecutive underscores"
                    )
                }
            }
        }
    }

    impl std::error::Error for InvalidUsername {}

    /// Best-effort input scrubbing applied before validation.
    ///
    /// Strips HTML-sensitive characters, `javascript:` prefixes, inline
    /// event-handler fragments (`onclick=` and friends), and the word
    /// `script`, then trims surrounding whitespace. Not a security
    /// boundary; validation still rejects anything outside the username
    /// charset.
    #[must_use]
    pub fn sanitize(input: &str) -> String {
        let mut cleaned: String = input
            .chars()
            .filter(|ch| !matches!(ch, '<' | '>' | '\'' | '"'))
            .collect();
        cleaned = remove_ignore_case(&cleaned, "javascript:");
        cleaned = remove_event_handlers(&cleaned);
        cleaned = remove_ignore_case(&cleaned, "script");
        cleaned.trim().to_string()
    }

    // ASCII-lowercases for the search so byte offsets stay aligned with
    // the original string.
    fn remove_ignore_case(haystack: &str, needle: &str) -> String {
        let lower = haystack.to_ascii_lowercase();
        let mut out = String::with_capacity(haystack.len());
        let mut rest = 0;
        let mut search = 0;
        while let Some(found) = lower[search..].find(needle) {
            let at = search + found;
            out.push_str(&haystack[rest..at]);
            rest = at + needle.len();
            search = rest;
        }
        out.push_str(&haystack[rest..]);
        out
    }

    // Drops `on<word>=` sequences, with optional whitespace before the `=`.
    fn remove_event_handlers(input: &str) -> String {
        let chars: Vec<char> = input.chars().collect();
        let mut out = String::with_capacity(input.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i].eq_ignore_ascii_case(&'o')
                && i + 1 < chars.len()
                && chars[i + 1].eq_ignore_ascii_case(&'n')
            {
                let mut j = i + 2;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                if j > i + 2 {
                    let mut k = j;
                    while k < chars.len() && chars[k].is_whitespace() {
                        k += 1;
                    }
                    if k < chars.len() && chars[k] == '=' {
                        i = k + 1;
                        continue;
                    }
                }
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }

    /// Check a candidate against the username format rules.
    ///
    /// # Errors
    ///
    /// Returns the first rule the candidate violates, in the order length,
    /// charset, underscore placement.
    pub fn validate_username(name: &str) -> Result<(), InvalidUsername> {
        let count = name.chars().count();
        if count < MIN_NAME_LENGTH {
            return Err(InvalidUsername::TooShort { name: name.into() });
        }
        if count > MAX_NAME_LENGTH {
            return Err(InvalidUsername::TooLong { name: name.into() });
        }

        for ch in name.chars() {
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                return Err(InvalidUsername::Char {
                    ch,
                    name: name.into(),
                });
            }
        }

        if name.starts_with('_') || name.ends_with('_') {
            return Err(InvalidUsername::UnderscoreEdge { name: name.into() });
        }
        if name.contains("__") {
            return Err(InvalidUsername::DoubleUnderscore { name: name.into() });
        }

        Ok(())
    }

    /// Report the first forbidden word a candidate contains, if any.
    ///
    /// Advisory only: these names pass format validation but the platform
    /// rejects them at signup time.
    #[must_use]
    pub fn forbidden_word(name: &str) -> Option<&'static str> {
        let lower = name.to_lowercase();
        FORBIDDEN_WORDS.iter().copied().find(|w| lower.contains(w))
    }
}

/// Default base URL of the upstream users API.
pub const USERS_API: &str = "https://users.roblox.com";

/// Default base URL of the public relay used as the last lookup fallback.
pub const RELAY: &str = "https://api.allorigins.win/raw";

/// Pause between successive lookups in [`bulk_resolve`], omitted after the
/// last one.
pub const BULK_DELAY: Duration = Duration::from_millis(500);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_RESULT_LIMIT: u32 = 10;

/// The availability verdict carried by a [`CheckResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum Status {
    /// No upstream account uses the name.
    Available,
    /// An account with exactly this name (case-insensitive) exists.
    Taken,
    /// Every lookup strategy failed; availability is unknown.
    Error,
    /// The name was produced by a generator and has not been checked.
    Generated,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Taken => write!(f, "taken"),
            Self::Error => write!(f, "error"),
            Self::Generated => write!(f, "generated"),
        }
    }
}

/// One normalized check outcome.
///
/// Produced by [`resolve`] and the generators, recorded to the history
/// log. Immutable once built: every field is set by a constructor and
/// never changes afterwards. `available` is `None` exactly for the
/// [`Status::Error`] and [`Status::Generated`] states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// The candidate the record describes.
    pub username: String,
    /// `Some(true)`/`Some(false)` for definitive verdicts, `None` otherwise.
    pub available: Option<bool>,
    /// The verdict.
    pub status: Status,
    /// Upstream account id when the name is taken.
    pub user_id: Option<u64>,
    /// Upstream display name when the name is taken.
    pub display_name: Option<String>,
    /// Failure message when every lookup strategy failed.
    pub error: Option<String>,
    /// Unix milliseconds at which the record was produced.
    pub timestamp: u64,
}

impl CheckResult {
    fn available(username: String) -> Self {
        Self {
            username,
            available: Some(true),
            status: Status::Available,
            user_id: None,
            display_name: None,
            error: None,
            timestamp: now_millis(),
        }
    }

    fn taken(username: String, user_id: u64, display_name: Option<String>) -> Self {
        Self {
            username,
            available: Some(false),
            status: Status::Taken,
            user_id: Some(user_id),
            display_name,
            error: None,
            timestamp: now_millis(),
        }
    }

    /// Record a lookup whose every strategy failed.
    #[must_use]
    pub fn failed(username: String, error: String) -> Self {
        Self {
            username,
            available: None,
            status: Status::Error,
            user_id: None,
            display_name: None,
            error: Some(error),
            timestamp: now_millis(),
        }
    }

    /// Record a generated candidate that has not been checked upstream.
    #[must_use]
    pub fn generated(username: String) -> Self {
        Self {
            username,
            available: None,
            status: Status::Generated,
            user_id: None,
            display_name: None,
            error: None,
            timestamp: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Errors that abort a [`resolve`] call before any upstream lookup.
///
/// Upstream failures never surface here; they are absorbed into the
/// returned [`CheckResult`] as [`Status::Error`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ResolveError {
    /// The candidate fails the username format rules. Nothing was sent
    /// upstream and no budget was charged.
    InvalidName(validation::InvalidUsername),
    /// The local call budget is exhausted. Nothing was sent upstream.
    RateLimited(BudgetExhausted),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(e) => write!(f, "invalid: {e}"),
            Self::RateLimited(e) => write!(f, "rate limited: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName(e) => Some(e),
            Self::RateLimited(e) => Some(e),
        }
    }
}

impl From<validation::InvalidUsername> for ResolveError {
    fn from(e: validation::InvalidUsername) -> Self {
        Self::InvalidName(e)
    }
}

impl From<BudgetExhausted> for ResolveError {
    fn from(e: BudgetExhausted) -> Self {
        Self::RateLimited(e)
    }
}

/// An HTTP client configured for the upstream users API.
///
/// Wraps the underlying HTTP agent to insulate callers from the specific
/// HTTP library version used internally.
///
/// # Example
///
/// ```no_run
/// use roblox_avail::check::Client;
///
/// let client = Client::new();
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    agent: Agent,
    users_api: String,
    relay: String,
}

impl Client {
    /// Create a new client against the public endpoints with default
    /// timeout settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoints(USERS_API, RELAY)
    }

    /// Create a client against custom endpoint bases.
    ///
    /// `users_api` replaces [`USERS_API`], `relay` replaces [`RELAY`].
    /// Trailing slashes are ignored. Intended for embedders and tests
    /// that point the resolver at a stand-in server.
    #[must_use]
    pub fn with_endpoints(users_api: impl Into<String>, relay: impl Into<String>) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
                " (",
                env!("CARGO_PKG_REPOSITORY"),
                ")"
            ))
            .build();
        Self {
            agent: Agent::new_with_config(config),
            users_api: users_api.into().trim_end_matches('/').to_string(),
            relay: relay.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, keyword: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &format!("{}/v1/users/search", self.users_api),
            [
                ("keyword", keyword.to_string()),
                ("limit", SEARCH_RESULT_LIMIT.to_string()),
            ],
        )
    }

    fn relay_url(&self, keyword: &str) -> Result<Url, url::ParseError> {
        let inner = self.search_url(keyword)?;
        Url::parse_with_params(&self.relay, [("url", inner.as_str())])
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

// Wire shape shared by the search and bulk-lookup endpoints. Unknown
// fields (badges, previous usernames) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserEntry {
    id: u64,
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    requested_username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserPage {
    #[serde(default)]
    data: Vec<UserEntry>,
}

fn is_exact_match(user: &UserEntry, candidate: &str) -> bool {
    user.name.eq_ignore_ascii_case(candidate)
        || user
            .requested_username
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(candidate))
}

// Lookup strategies, tried in the order of FALLBACK_CHAIN until one
// succeeds. Success means the endpoint answered and was decoded; whether
// a match was found is the verdict, not part of success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    BulkLookup,
    Search,
    RelaySearch,
}

const FALLBACK_CHAIN: [Strategy; 3] =
    [Strategy::BulkLookup, Strategy::Search, Strategy::RelaySearch];

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BulkLookup => write!(f, "bulk-lookup"),
            Self::Search => write!(f, "search"),
            Self::RelaySearch => write!(f, "relay-search"),
        }
    }
}

impl Strategy {
    fn run(self, client: &Client, candidate: &str) -> Result<Option<UserEntry>, AttemptError> {
        match self {
            Self::BulkLookup => bulk_lookup(client, candidate),
            Self::Search => {
                let url = client.search_url(candidate)?;
                search(client, &url, candidate)
            }
            Self::RelaySearch => {
                let url = client.relay_url(candidate)?;
                search(client, &url, candidate)
            }
        }
    }
}

#[derive(Debug)]
enum AttemptError {
    Endpoint(url::ParseError),
    Http(Box<ureq::Error>),
    Decode(serde_json::Error),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(e) => write!(f, "bad endpoint url: {e}"),
            Self::Http(e) => write!(f, "{e}"),
            Self::Decode(e) => write!(f, "malformed response: {e}"),
        }
    }
}

impl From<url::ParseError> for AttemptError {
    fn from(e: url::ParseError) -> Self {
        Self::Endpoint(e)
    }
}

impl From<ureq::Error> for AttemptError {
    fn from(e: ureq::Error) -> Self {
        Self::Http(Box::new(e))
    }
}

impl From<serde_json::Error> for AttemptError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e)
    }
}

fn bulk_lookup(client: &Client, candidate: &str) -> Result<Option<UserEntry>, AttemptError> {
    let url = format!("{}/v1/usernames/users", client.users_api);
    let payload = serde_json::json!({
        "usernames": [candidate],
        "excludeBannedUsers": true,
    });
    let mut response = client
        .agent
        .post(&url)
        .header("content-type", "application/json")
        .send(payload.to_string().as_str())?;
    let body = response.body_mut().read_to_string()?;
    let page: UserPage = serde_json::from_str(&body)?;
    Ok(page.data.into_iter().find(|u| is_exact_match(u, candidate)))
}

fn search(client: &Client, url: &Url, candidate: &str) -> Result<Option<UserEntry>, AttemptError> {
    let mut response = client.agent.get(url.as_str()).call()?;
    let body = response.body_mut().read_to_string()?;
    let page: UserPage = serde_json::from_str(&body)?;
    Ok(page.data.into_iter().find(|u| is_exact_match(u, candidate)))
}

/// Check whether a username is available upstream.
///
/// The candidate is sanitized, validated, and charged exactly one unit
/// against `budget` before any network traffic. The lookup then walks a
/// fixed fallback chain -- bulk lookup, keyword search, keyword search
/// through the public relay -- and stops at the first endpoint that
/// answers. "Taken" means an entry whose name equals the candidate,
/// case-insensitively, in full; substring matches never count.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidName`] if the candidate fails the
/// format rules (before any budget charge), or
/// [`ResolveError::RateLimited`] if the budget is exhausted. Upstream
/// failures are never errors: if every strategy fails, the returned
/// record carries [`Status::Error`] and the last failure message.
///
/// # Example
///
/// ```no_run
/// use roblox_avail::budget::RateBudget;
/// use roblox_avail::check::{Client, Status, resolve};
///
/// let client = Client::new();
/// let budget = RateBudget::new();
/// match resolve(&client, &budget, "builderman") {
///     Ok(result) if result.status == Status::Available => println!("go grab it!"),
///     Ok(result) => println!("{}", result.status),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
pub fn resolve(
    client: &Client,
    budget: &RateBudget,
    candidate: &str,
) -> Result<CheckResult, ResolveError> {
    let candidate = validation::sanitize(candidate);
    validation::validate_username(&candidate)?;

    budget.ensure_available()?;
    // One unit per invocation, not per attempt.
    budget.charge(1);

    let mut last_error = None;
    for strategy in FALLBACK_CHAIN {
        debug!(%strategy, candidate = %candidate, "lookup attempt");
        match strategy.run(client, &candidate) {
            Ok(Some(user)) => {
                return Ok(CheckResult::taken(candidate, user.id, user.display_name));
            }
            Ok(None) => return Ok(CheckResult::available(candidate)),
            Err(e) => {
                warn!(%strategy, error = %e, "lookup attempt failed");
                last_error = Some(e);
            }
        }
    }

    let message = match last_error {
        Some(e) => e.to_string(),
        None => "no lookup strategy attempted".to_string(),
    };
    Ok(CheckResult::failed(candidate, message))
}

/// Check a batch of candidates one at a time, in input order.
///
/// Lookups are strictly sequential with a [`BULK_DELAY`] pause between
/// successive calls (omitted after the last). A candidate that fails
/// validation or hits the rate budget becomes a [`Status::Error`] entry
/// instead of aborting the batch. `on_progress(position, total, result)`
/// runs synchronously after every item, error or not, with `position`
/// counting from 1. The returned vec lines up 1:1 with `candidates`.
///
/// There is no way to cancel a batch once started; the per-call timeout
/// is the only bound on its duration.
pub fn bulk_resolve<F>(
    client: &Client,
    budget: &RateBudget,
    candidates: &[String],
    mut on_progress: F,
) -> Vec<CheckResult>
where
    F: FnMut(usize, usize, &CheckResult),
{
    let total = candidates.len();
    let mut results = Vec::with_capacity(total);

    for (i, candidate) in candidates.iter().enumerate() {
        let result = match resolve(client, budget, candidate) {
            Ok(result) => result,
            Err(e) => CheckResult::failed(candidate.clone(), e.to_string()),
        };
        on_progress(i + 1, total, &result);
        results.push(result);

        if i + 1 < total {
            thread::sleep(BULK_DELAY);
        }
    }

    results
}
