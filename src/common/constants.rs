// Operator protocol
pub const NOT_OPEN_MSG: &str = "operator must be opened before calling next";
pub const MIN_JOIN_BUFFERS: usize = 3;
pub const MIN_SORT_BUFFERS: usize = 3;

// Spill files
pub const SPILL_FRAME_HEADER_BYTES: usize = 4;
pub const UNKNOWN_SPILL_ID_MSG: &str = "No spill file corresponding to the given id exists.";
pub const TRUNCATED_FRAME_MSG: &str = "Spill file ends in the middle of a page frame.";

// Temp file name prefixes, one per owner kind and role.
pub const BNJ_INNER_PREFIX: &str = "bnj-inner-";
pub const GHJ_RIGHT_PREFIX: &str = "ghj-right-";
pub const GHJ_LEFT_BUCKET_PREFIX: &str = "ghj-left";
pub const GHJ_RIGHT_BUCKET_PREFIX: &str = "ghj-rbkt";
pub const SORT_RUN_PREFIX: &str = "sort-run-";
pub const SORT_MERGE_PREFIX: &str = "sort-merge-";
