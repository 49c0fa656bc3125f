use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use warp::Filter;

mod agents;
mod api;
mod chat;
mod config;
mod error;
mod ingest;
mod llm;
mod metrics;
mod middleware;
mod models;
mod redis_client;
mod store;
mod vector;

#[cfg(test)]
mod testing;

use agents::dish_agent::DishAgent;
use agents::memory::{InMemorySessionMemory, RedisSessionMemory, SessionMemory};
use agents::rag::RecipeRag;
use agents::retriever::{RetrievalConfig, RetrieverAgent};
use agents::structurer::{ExtractionResponder, StructuredResponder, ToolBindingResponder};
use agents::Assistant;
use config::{AssistantMode, Config, MemoryBackend, StructuringMode, VectorBackend};
use error::ApiError;
use llm::{ChatModel, OpenAiChatModel};
use store::{DishRepository, FirebaseStore};
use vector::pinecone::{PineconeEmbeddings, PineconeIndex};
use vector::{EmbeddingProvider, InMemoryVectorIndex, VectorIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing; RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Starting Food Surgeon");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let store = Arc::new(FirebaseStore::new(
        client.clone(),
        config.firebase_url.clone(),
        config.firebase_auth.clone(),
    ));
    let repository = DishRepository::new(store, config.dishes_path.clone());
    info!(path = %config.dishes_path, "Document store configured");

    let (embedder, index) = vector_stack(&config, &client)?;
    let model = chat_model(&config, &client)?;

    let retriever = RetrieverAgent::new(
        embedder.clone(),
        index.clone(),
        RetrievalConfig {
            top_k: config.retrieval_top_k,
            min_score: config.retrieval_min_score,
        },
    );

    let assistant = match config.assistant_mode {
        AssistantMode::Pipeline => {
            let responder: Arc<dyn StructuredResponder> = match config.structuring_mode {
                StructuringMode::Tools => Arc::new(ToolBindingResponder::new(model)),
                StructuringMode::Extraction => Arc::new(ExtractionResponder::new(model)),
            };
            info!(mode = ?config.structuring_mode, "Assistant: RAG pipeline");
            Assistant::Pipeline {
                rag: RecipeRag::new(retriever, responder),
                include_history: config.include_history,
            }
        }
        AssistantMode::Agent => {
            let memory = session_memory(&config).await?;
            info!(max_steps = config.agent_max_steps, "Assistant: dish agent");
            Assistant::Agent(DishAgent::new(
                model,
                retriever,
                memory,
                config.agent_max_steps,
            ))
        }
    };

    let state = Arc::new(api::AppState {
        repository,
        assistant,
        sessions: chat::SessionRegistry::new(Duration::from_secs(config.session_idle_secs)),
        embedder,
        index,
        metrics: metrics::Metrics::new()?,
    });

    // Build API routes
    let api_routes = api::routes(state.clone())
        .with(warp::log("api"))
        .with(middleware::cors());

    // Health check route
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    // Metrics route
    let metrics_state = state.clone();
    let metrics = warp::path("metrics")
        .and(warp::get())
        .and_then(move || {
            let state = metrics_state.clone();
            async move {
                let (buffer, content_type) = state
                    .metrics
                    .encode()
                    .map_err(warp::reject::custom)?;
                Ok::<_, warp::Rejection>(warp::reply::with_header(
                    buffer,
                    "Content-Type",
                    content_type,
                ))
            }
        });

    let routes = health
        .or(metrics)
        .or(api_routes)
        .recover(error::handle_rejection);

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes).run(addr).await;

    Ok(())
}

fn vector_stack(
    config: &Config,
    client: &reqwest::Client,
) -> error::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn VectorIndex>)> {
    let api_key = required(&config.pinecone_api_key, "PINECONE_API_KEY")?;
    let embedder = Arc::new(PineconeEmbeddings::new(
        client.clone(),
        api_key.clone(),
        config.embedding_model.clone(),
    ));

    let index: Arc<dyn VectorIndex> = match config.vector_backend {
        VectorBackend::Pinecone => {
            let host = required(&config.pinecone_index_host, "PINECONE_INDEX_HOST")?;
            info!(%host, "Vector index: Pinecone");
            Arc::new(PineconeIndex::new(
                client.clone(),
                api_key,
                host,
                config.pinecone_namespace.clone(),
            ))
        }
        VectorBackend::Memory => {
            info!("Vector index: in-memory, POST /api/v1/index to populate it");
            Arc::new(InMemoryVectorIndex::new())
        }
    };

    Ok((embedder, index))
}

fn chat_model(config: &Config, client: &reqwest::Client) -> error::Result<Arc<dyn ChatModel>> {
    let api_key = required(&config.openai_api_key, "OPENAI_API_KEY")?;
    info!(model = %config.chat_model, "Chat model configured");
    Ok(Arc::new(OpenAiChatModel::new(
        client.clone(),
        api_key,
        config.openai_base_url.clone(),
        config.chat_model.clone(),
        config.temperature,
    )))
}

async fn session_memory(config: &Config) -> error::Result<Arc<dyn SessionMemory>> {
    match config.memory_backend {
        MemoryBackend::Memory => Ok(Arc::new(InMemorySessionMemory::new())),
        MemoryBackend::Redis => {
            let client = redis_client::RedisClient::new(&config.redis_url).await?;
            info!("Redis connection established");
            Ok(Arc::new(RedisSessionMemory::new(
                client,
                config.memory_ttl_secs,
            )))
        }
    }
}

fn required(value: &Option<String>, name: &str) -> error::Result<String> {
    value
        .clone()
        .ok_or_else(|| ApiError::ConfigError(format!("{name} must be set")))
}
