//! Document pipeline: normalization, chunking, reduction, and orchestration.

pub mod chunking;
pub mod normalize;
pub mod reduce;
pub mod sanitize;
pub mod semantic;
mod service;
pub mod types;

pub use chunking::{chunk_text, measure};
pub use normalize::{format_with_metadata, normalize};
pub use reduce::{ReduceOptions, reduce};
pub use semantic::{SimilarityBackend, chunk_document};
pub use service::{
    BatchItem, BatchReport, BatchResult, BatchUpdate, PipelineSettings, PipelineStage,
    SummarizationApi, SummarizationService, SummarizeOptions, SummaryOutcome,
};
pub use types::{
    CanonicalDocument, Chunk, ChunkMethod, ChunkOptions, ChunkingError, DocumentInput,
    DocumentMetadata, InputError, Segment,
};
