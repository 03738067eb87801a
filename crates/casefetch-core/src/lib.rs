pub mod case;
pub mod challenge;
pub mod detect;
pub mod extract;

pub use case::{CaseQuery, CaseRecord, OrderLink, QueryError, RawResponse, RetrievalOutcome};
pub use challenge::{ChallengeGate, ChallengePrompt, Operator, RejectReason, Verification};
pub use detect::{Detection, MarkerSet};
pub use extract::{ExtractError, RecordExtractor};
