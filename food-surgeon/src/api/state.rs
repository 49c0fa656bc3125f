use std::sync::Arc;

use crate::agents::Assistant;
use crate::chat::SessionRegistry;
use crate::metrics::Metrics;
use crate::store::DishRepository;
use crate::vector::{EmbeddingProvider, VectorIndex};

/// Everything the handlers share, built once at startup.
pub struct AppState {
    pub repository: DishRepository,
    pub assistant: Assistant,
    pub sessions: SessionRegistry,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub metrics: Metrics,
}

pub type SharedState = Arc<AppState>;
