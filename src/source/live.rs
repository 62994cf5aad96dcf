//! Live source reading straight from the substrate client

use async_trait::async_trait;
use std::sync::Arc;

use super::{ListOptions, LiveSource, WorkflowClient};
use crate::error::ApiError;
use crate::query::ListQuery;
use crate::workflow::{ListMeta, WorkflowList};

pub struct ClientLiveSource {
    client: Arc<dyn WorkflowClient>,
}

impl ClientLiveSource {
    pub fn new(client: Arc<dyn WorkflowClient>) -> Self {
        Self { client }
    }

    async fn fetch(&self, query: &ListQuery) -> Result<WorkflowList, ApiError> {
        let options = ListOptions {
            label_selector: query.label_selector.to_string(),
            ..Default::default()
        };
        Ok(self.client.list(&query.namespace, &options).await?)
    }
}

#[async_trait]
impl LiveSource for ClientLiveSource {
    async fn count_workflows(&self, query: &ListQuery) -> Result<usize, ApiError> {
        let list = self.fetch(query).await?;
        Ok(query.count(list.items.iter()))
    }

    async fn list_workflows(&self, query: &ListQuery) -> Result<WorkflowList, ApiError> {
        let list = self.fetch(query).await?;
        Ok(WorkflowList {
            metadata: ListMeta {
                resource_version: list.metadata.resource_version.clone(),
                ..Default::default()
            },
            items: query.select(list.items.iter()),
        })
    }
}
