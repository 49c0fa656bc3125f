// Catalog indexing: document store -> embeddings -> vector index

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;

use crate::error::Result;
use crate::models::DishRecord;
use crate::store::DishRepository;
use crate::vector::{EmbeddingProvider, IndexedVector, VectorIndex};

/// Dishes per embedding request.
const BATCH_SIZE: usize = 50;
/// Embedding requests in flight at once.
const CONCURRENT_BATCHES: usize = 4;

/// The text that gets embedded and later handed to the model as context.
pub fn dish_document(record: &DishRecord) -> String {
    let mut text = format!("name: {}\n", record.name);
    if let Some(kind) = &record.kind {
        text.push_str(&format!("type: {kind}\n"));
    }
    text.push_str(&format!(
        "ingredients: {}\ndescription: {}",
        record.ingredients, record.description
    ));
    text
}

async fn embed_batch(
    chunk: &[DishRecord],
    embedder: &dyn EmbeddingProvider,
) -> Result<Vec<IndexedVector>> {
    let texts: Vec<String> = chunk.iter().map(dish_document).collect();
    let embeddings = embedder.embed_documents(&texts).await?;
    Ok::<_, crate::error::ApiError>(
        chunk
            .iter()
            .zip(texts)
            .zip(embeddings)
            .map(|((record, text), values)| IndexedVector {
                id: record.id.clone(),
                values,
                text,
            })
            .collect::<Vec<_>>(),
    )
}

pub async fn index_dishes(
    dishes: &[DishRecord],
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<usize> {
    let pending: Vec<_> = dishes
        .chunks(BATCH_SIZE)
        .map(|chunk| embed_batch(chunk, embedder))
        .collect();
    let batches: Vec<Vec<IndexedVector>> = stream::iter(pending)
        .buffered(CONCURRENT_BATCHES)
        .try_collect()
        .await?;

    let mut indexed = 0;
    for batch in &batches {
        index.upsert(batch).await?;
        indexed += batch.len();
    }
    Ok(indexed)
}

/// Loads the whole catalog and (re)indexes it.
pub async fn index_catalog(
    repository: &DishRepository,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<usize> {
    info!("Indexing dish catalog");
    let dishes = repository.load_all().await?;
    let indexed = index_dishes(&dishes, embedder, index).await?;
    info!(indexed, "Dish catalog indexed");
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_catalog, HashEmbedder};
    use crate::vector::InMemoryVectorIndex;

    #[test]
    fn test_dish_document_lists_fields() {
        let dishes = sample_catalog();
        let text = dish_document(&dishes[0]);

        assert!(text.starts_with("name: Борщ\ntype: Суп\n"));
        assert!(text.contains("ingredients: "));
        assert!(text.contains("description: "));
    }

    #[test]
    fn test_dish_document_without_type() {
        let record = DishRecord {
            id: "x".into(),
            name: "Узвар".into(),
            kind: None,
            ingredients: "сухофрукти".into(),
            description: "Зварити".into(),
            image: None,
        };
        assert_eq!(
            dish_document(&record),
            "name: Узвар\ningredients: сухофрукти\ndescription: Зварити"
        );
    }

    #[tokio::test]
    async fn test_index_dishes_upserts_every_record() {
        let embedder = HashEmbedder::default();
        let index = InMemoryVectorIndex::new();
        let dishes = sample_catalog();

        let indexed = index_dishes(&dishes, &embedder, &index).await.unwrap();

        assert_eq!(indexed, dishes.len());
        let query = embedder.embed_query("борщ").await.unwrap();
        let hits = index.query(&query, 10).await.unwrap();
        assert_eq!(hits.len(), dishes.len());
        assert_eq!(hits[0].id, "borshch");
        assert!(hits[0].content.starts_with("name: Борщ"));
    }

    #[tokio::test]
    async fn test_index_empty_catalog() {
        let embedder = HashEmbedder::default();
        let index = InMemoryVectorIndex::new();
        assert_eq!(index_dishes(&[], &embedder, &index).await.unwrap(), 0);
    }
}
