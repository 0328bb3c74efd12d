// Kometa-AI Constants
// Fixed values shared across modules; do not change without updating DESIGN.md.

/// Label prefix the system exclusively owns. It may only add/remove labels
/// that begin with this prefix.
pub const LABEL_PREFIX: &str = "KAI-";

/// Current on-disk schema version for the state document. A mismatch on
/// load is non-fatal and non-migrating.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Bounded ring sizes for the Decision Store's change/error logs.
pub const MAX_CHANGE_LOG_ENTRIES: usize = 100;
pub const MAX_ERROR_LOG_ENTRIES: usize = 50;

/// Number of rotating timestamped backups kept alongside the state file.
pub const MAX_STATE_BACKUPS: usize = 5;

/// Default confidence threshold for a rubric when unspecified.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Default batch size for oracle requests; overridable via config/flag.
pub const DEFAULT_BATCH_SIZE: usize = 150;

/// Oracle retry/backoff parameters.
pub const ORACLE_RETRY_INITIAL_BACKOFF_SECS: u64 = 1;
pub const ORACLE_RETRY_MAX_BACKOFF_SECS: u64 = 30;
pub const ORACLE_RETRY_MAX_ATTEMPTS: u32 = 10;

/// Scheduler loop sleeps in tranches no longer than this so a termination
/// signal is observed quickly.
pub const SCHEDULER_POLL_INTERVAL_SECS: u64 = 60;

/// Rubric source file extensions recognized by the extractor.
pub const RUBRIC_FILE_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Delimiters that bound an embedded rubric block inside a host document,
/// each introduced by the host comment marker (`#`).
pub const RUBRIC_BLOCK_START: &str = "=== KOMETA-AI ===";
pub const RUBRIC_BLOCK_END: &str = "=== END KOMETA-AI ===";

/// The scalar key in the host document that must equal a rubric's
/// `expected_label`.
pub const HOST_LABEL_KEY: &str = "radarr_taglist";

/// Filesystem layout.
pub const STATE_DIR_NAME: &str = "state";
pub const STATE_FILE_NAME: &str = "kometa_state.json";
pub const STATE_LOCK_FILE_NAME: &str = "kometa_state.lock";
pub const STATE_BACKUPS_DIR_NAME: &str = "backups";

/// Default oracle model pricing fallbacks (USD per million tokens), used
/// only if the operator has not supplied values via config.
pub const DEFAULT_INPUT_COST_PER_MILLION: f64 = 3.0;
pub const DEFAULT_OUTPUT_COST_PER_MILLION: f64 = 15.0;

/// Default oracle generation parameters.
pub const DEFAULT_ORACLE_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_ORACLE_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 120;

/// Middle confidence band within which the oracle is asked to justify its
/// decision with `reasoning`.
pub const REASONING_BAND_LOW: f64 = 0.3;
pub const REASONING_BAND_HIGH: f64 = 0.8;

/// Number of top-billed actors folded into the fingerprint.
pub const FINGERPRINT_TOP_ACTORS: usize = 5;

/// Default oracle model identifier, overridable via `CLAUDE_MODEL`.
pub const DEFAULT_ORACLE_MODEL: &str = "claude-haiku-4-5";
