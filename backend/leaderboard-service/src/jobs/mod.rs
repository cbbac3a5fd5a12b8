// ============================================
// Background Jobs Module
// ============================================
//
// Background job runners, independent of the ranking request path:
// - Bulk user generation (singleton worker pool, status persisted in the store)
//
// Triggered through the API facade (start/stop/status) or by running the
// binary as a standalone generation job.

pub mod bulk_generation;

pub use bulk_generation::{BulkGenerationCoordinator, GENERATION_TASK_KEY};
