//! Session transcripts: token-keyed, line-format conversation history.
//!
//! Every conversation is identified by a [`SessionToken`] and backed by one
//! append-only transcript. [`transcript`] holds the pure parsing and
//! rendering rules; [`TranscriptStore`] implementations handle persistence.

pub mod clock;
pub mod file_store;
pub mod in_memory;
pub mod locks;
pub mod retention;
pub mod token;
pub mod traits;
pub mod transcript;

pub use clock::{Clock, FixedClock, SystemClock};
pub use file_store::FileTranscriptStore;
pub use in_memory::InMemoryTranscriptStore;
pub use token::{SessionToken, TokenError};
pub use traits::{
    AppendOutcome, ConversationPair, Exchange, Speaker, TranscriptLock, TranscriptStore,
};
pub use transcript::{
    build_conversation_pairs, format_context, parse_recent_exchanges,
    parse_recent_exchanges_with_stats, ParseStats,
};

use std::path::Path;
use std::sync::Arc;

/// Pair limit for the live-turn `conversation_length` count.
pub const LIVE_TURN_PAIR_LIMIT: usize = 25;
/// Pair limit for the history viewer.
pub const HISTORY_VIEW_PAIR_LIMIT: usize = 50;

/// Create the file-backed transcript store rooted at `dir`.
pub fn create_transcript_store(dir: &Path) -> Arc<dyn TranscriptStore> {
    Arc::new(FileTranscriptStore::new(dir, Arc::new(SystemClock)))
}
