//! Line-format transcript parsing and rendering.
//!
//! A transcript file holds one message per line:
//!
//! ```text
//! 07/03 09:05:03 User: Hola, ¿cómo estás?
//! 07/03 09:05:03 Assistant: ¡Muy bien! ¿Y tú?
//! ```
//!
//! Lines are recognised purely by the `" User: "` / `" Assistant: "`
//! separators. Anything else is dropped. Message text containing a newline or
//! one of the separators cannot be represented unambiguously; that is a
//! known limitation of the format and is not escaped.

use super::traits::{ConversationPair, Exchange, Speaker};

pub const USER_SEPARATOR: &str = " User: ";
pub const ASSISTANT_SEPARATOR: &str = " Assistant: ";

/// Counts gathered while scanning a transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Non-blank lines carrying a role separator.
    pub message_lines: usize,
    /// Non-blank lines without a role separator.
    pub dropped_lines: usize,
}

fn classify(line: &str) -> Option<Exchange> {
    let (speaker, (stamp, message)) = if let Some(parts) = line.split_once(USER_SEPARATOR) {
        (Speaker::User, parts)
    } else if let Some(parts) = line.split_once(ASSISTANT_SEPARATOR) {
        (Speaker::Assistant, parts)
    } else {
        return None;
    };

    Some(Exchange {
        timestamp: (!stamp.is_empty()).then(|| stamp.to_string()),
        speaker,
        message: message.to_string(),
    })
}

fn is_message_line(line: &str) -> bool {
    line.contains(USER_SEPARATOR) || line.contains(ASSISTANT_SEPARATOR)
}

/// Trimmed, non-blank lines that carry a role separator.
fn message_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && is_message_line(line))
}

/// [`parse_recent_exchanges`] plus counts for observability.
pub fn parse_recent_exchanges_with_stats(
    raw: &str,
    max_exchanges: usize,
) -> (Vec<Exchange>, ParseStats) {
    let mut stats = ParseStats::default();
    let mut parsed = Vec::new();

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match classify(line) {
            Some(exchange) => {
                stats.message_lines += 1;
                parsed.push(exchange);
            }
            None => stats.dropped_lines += 1,
        }
    }

    // One exchange is a User line plus its Assistant reply.
    let window = max_exchanges.saturating_mul(2);
    let start = parsed.len().saturating_sub(window);
    parsed.drain(..start);

    (parsed, stats)
}

/// The trailing `max_exchanges` exchanges of a transcript, oldest first.
///
/// Malformed lines are skipped. An unpaired trailing User line is kept.
pub fn parse_recent_exchanges(raw: &str, max_exchanges: usize) -> Vec<Exchange> {
    parse_recent_exchanges_with_stats(raw, max_exchanges).0
}

/// Complete User→Assistant pairs, keeping only the last `limit`.
///
/// A pair needs a User line immediately followed by an Assistant line.
/// On a mismatch the scan moves forward a single line and tries again, so a
/// dangling User line is skipped rather than mis-paired.
pub fn build_conversation_pairs(raw: &str, limit: usize) -> Vec<ConversationPair> {
    let lines: Vec<&str> = message_lines(raw).collect();
    let mut pairs = Vec::new();

    let mut i = 0;
    while i + 1 < lines.len() {
        let user_line = lines[i];
        let assistant_line = lines[i + 1];
        match (
            user_line.split_once(USER_SEPARATOR),
            assistant_line.split_once(ASSISTANT_SEPARATOR),
        ) {
            (Some((_, user)), Some((_, assistant))) => {
                pairs.push(ConversationPair {
                    user: user.to_string(),
                    assistant: assistant.to_string(),
                });
                i += 2;
            }
            _ => i += 1,
        }
    }

    let start = pairs.len().saturating_sub(limit);
    pairs.split_off(start)
}

/// Flatten exchanges into `Role: message` lines for a model prompt.
///
/// Returns an empty string for no exchanges; callers treat that as "no
/// history" and leave the history section out entirely.
pub fn format_context(exchanges: &[Exchange]) -> String {
    exchanges
        .iter()
        .map(|exchange| format!("{}: {}", exchange.speaker.label(), exchange.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one transcript line without a trailing newline.
pub fn render_line(stamp: &str, speaker: Speaker, message: &str) -> String {
    format!("{stamp} {}: {message}", speaker.label())
}

/// Render a User/Assistant pair as appended to a transcript.
///
/// `continues_file` prefixes the pair with a newline so it starts on its own
/// line after existing content; a fresh file gets no leading blank line.
pub fn render_pair(stamp: &str, user: &str, assistant: &str, continues_file: bool) -> String {
    let lead = if continues_file { "\n" } else { "" };
    format!(
        "{lead}{}\n{}",
        render_line(stamp, Speaker::User, user),
        render_line(stamp, Speaker::Assistant, assistant)
    )
}
