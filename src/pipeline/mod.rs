//! 诊断轨迹：原始诊断归一化与 PipelineRecord

pub mod record;
pub mod recorder;

pub use record::{
    BlockRecord, ContentFilteringRecord, FilterRecord, FilterScores, LlmRecord, MaskingRecord, MessageRecord,
    ModuleDiagnostic, NormalizedDiagnostic, PipelineRecord, RawDiagnostic, ResultPreview,
    ToolCallRecord,
};
pub use recorder::{
    extract_scores, is_passed_message, masked_entities, normalize_filter, PipelineRecorder,
    PASSED_SENTINEL,
};
