//! RecallForge Search Library
//!
//! Local and remote recall:
//! - BM25 inverted index and cosine vector search
//! - Min-max score fusion and the hybrid retriever
//! - Recall streams (local snapshot, managed index, document AI)

pub mod retrieval;
pub mod streams;

pub use retrieval::{Bm25Index, CorpusSnapshot, HybridRetriever, RetrievalMode, ScoreFusion};
pub use streams::{LocalStream, RecallStream, RemoteStream, SearchBackend, StreamResult};
