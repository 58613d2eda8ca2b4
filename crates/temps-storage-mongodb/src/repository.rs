use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::Collection;
use temps_storage::{
    Filter, ListOptions, Record, Repository, RepositoryDefinition, Result, SortDirection,
    StorageError,
};
use tracing::{debug, error};

use crate::convert::{
    document_to_record, field_name, record_to_new_document, record_to_update, to_mongo_filter,
    with_ttl_condition, OBJECT_ID_FIELD,
};
use crate::error::classify;

/// Repository over one MongoDB collection
pub struct MongoRepository {
    collection: Collection<Document>,
    definition: RepositoryDefinition,
}

impl MongoRepository {
    pub fn new(collection: Collection<Document>, definition: RepositoryDefinition) -> Self {
        Self {
            collection,
            definition,
        }
    }

    fn query(&self, filter: &Filter) -> Result<Document> {
        let query = to_mongo_filter(filter, self.definition.custom_id())?;
        Ok(with_ttl_condition(query, &self.definition))
    }

    /// First live document matching the filter, in stored form
    async fn find_document(&self, filter: &Filter) -> Result<Document> {
        let query = self.query(filter)?;
        debug!(
            "Finding one in {} with {}",
            self.definition.name(),
            query
        );

        self.collection
            .find_one(query)
            .await
            .map_err(|e| {
                error!("Failed to query {}: {}", self.definition.name(), e);
                classify("failed to query collection", e)
            })?
            .ok_or_else(|| {
                StorageError::not_found(format!("no record in {} matches", self.definition.name()))
            })
    }

    async fn find_by_id(&self, id: Bson) -> Result<Document> {
        self.collection
            .find_one(doc! { OBJECT_ID_FIELD: id })
            .await
            .map_err(|e| classify("failed to read back record", e))?
            .ok_or_else(|| StorageError::not_found("record disappeared after write"))
    }
}

fn object_id(document: &Document) -> Result<Bson> {
    document
        .get(OBJECT_ID_FIELD)
        .cloned()
        .ok_or_else(|| StorageError::backend("stored document has no _id"))
}

#[async_trait]
impl Repository for MongoRepository {
    fn definition(&self) -> &RepositoryDefinition {
        &self.definition
    }

    async fn get_one(&self, filter: &Filter) -> Result<Record> {
        self.find_document(filter).await.map(document_to_record)
    }

    async fn get_all(&self, filter: &Filter, options: &ListOptions) -> Result<Vec<Record>> {
        let query = self.query(filter)?;
        let mut find = self.collection.find(query);

        if let Some(order_by) = &options.order_by {
            let direction = match options.direction {
                SortDirection::Ascending => 1,
                SortDirection::Descending => -1,
            };
            find = find.sort(doc! { field_name(order_by): direction });
        }
        if options.offset > 0 {
            find = find.skip(options.offset as u64);
        }
        if options.limit > 0 {
            find = find.limit(options.limit as i64);
        }

        let documents: Vec<Document> = find
            .await
            .map_err(|e| classify("failed to query collection", e))?
            .try_collect()
            .await
            .map_err(|e| classify("failed to read query results", e))?;

        Ok(documents.into_iter().map(document_to_record).collect())
    }

    async fn save(&self, record: Record, filter: Option<&Filter>) -> Result<Record> {
        let Some(filter) = filter else {
            let document = record_to_new_document(&record, &self.definition)?;
            let id = object_id(&document)?;

            self.collection
                .insert_one(&document)
                .await
                .map_err(|e| classify("failed to insert record", e))?;
            debug!("Inserted {} into {}", id, self.definition.name());

            return Ok(document_to_record(document));
        };

        let existing = self.find_document(filter).await?;
        let id = object_id(&existing)?;
        let set = record_to_update(&record, &self.definition)?;
        if set.is_empty() {
            return Ok(document_to_record(existing));
        }

        let result = self
            .collection
            .update_one(doc! { OBJECT_ID_FIELD: id.clone() }, doc! { "$set": set })
            .await
            .map_err(|e| classify("failed to update record", e))?;
        if result.matched_count == 0 {
            return Err(StorageError::not_found(format!(
                "record {} was removed before update",
                id
            )));
        }

        self.find_by_id(id).await.map(document_to_record)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<()> {
        let existing = self.find_document(filter).await?;
        let id = object_id(&existing)?;

        let result = self
            .collection
            .delete_one(doc! { OBJECT_ID_FIELD: id.clone() })
            .await
            .map_err(|e| classify("failed to delete record", e))?;
        if result.deleted_count == 0 {
            return Err(StorageError::not_found(format!("record {} already deleted", id)));
        }
        Ok(())
    }

    async fn delete_all(&self, filter: &Filter) -> Result<()> {
        let query = to_mongo_filter(filter, self.definition.custom_id())?;
        let result = self
            .collection
            .delete_many(query)
            .await
            .map_err(|e| classify("failed to delete records", e))?;
        debug!(
            "Deleted {} records from {}",
            result.deleted_count,
            self.definition.name()
        );
        Ok(())
    }
}
