use clickdown_api::Task;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ClickUpApi, FetchResult};
use crate::config::{ExtractConfig, RetryPolicy};
use crate::retry::call_with_retry;

/// One page of tasks and whether another page may follow
#[derive(Debug, Default)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub has_more: bool,
}

/// Fetches task pages with retry, rate-limit cooldowns and a hard page ceiling
pub struct PageFetcher {
    api: Arc<dyn ClickUpApi>,
    policy: RetryPolicy,
    page_size: usize,
    max_pages: u32,
}

impl PageFetcher {
    pub fn new(api: Arc<dyn ClickUpApi>, config: &ExtractConfig) -> Self {
        Self {
            api,
            policy: config.retry.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages_per_list,
        }
    }

    /// Fetch page `page` of `list_id`.
    ///
    /// The API does not report totals, so `has_more` is true only for a full
    /// page that is not flagged `last_page` and is below the page ceiling.
    #[tracing::instrument(name = "fetcher.page", skip(self))]
    pub async fn fetch(&self, list_id: &str, archived: bool, page: u32) -> FetchResult<TaskPage> {
        if page >= self.max_pages {
            warn!(
                "[PageFetcher] list {} archived={} page {} is past the ceiling of {} pages, not fetching",
                list_id, archived, page, self.max_pages
            );
            return Ok(TaskPage::default());
        }

        let what = format!("tasks of list {} (archived={}, page={})", list_id, archived, page);
        let api = &self.api;
        let response =
            call_with_retry(&self.policy, &what, || api.task_page(list_id, archived, page)).await?;

        let full = response.tasks.len() >= self.page_size;
        let last_page = response.last_page.unwrap_or(false);
        let below_ceiling = page + 1 < self.max_pages;
        if full && !last_page && !below_ceiling {
            warn!(
                "[PageFetcher] list {} archived={} hit the ceiling of {} pages; remaining tasks are not extracted",
                list_id, archived, self.max_pages
            );
        }

        debug!(
            "[PageFetcher] list {} archived={} page {}: {} tasks",
            list_id,
            archived,
            page,
            response.tasks.len()
        );

        Ok(TaskPage {
            has_more: full && !last_page && below_ceiling,
            tasks: response.tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeClickUp, FakeEndpoint};
    use clickdown_api::FetchError;

    fn fetcher(fake: Arc<FakeClickUp>, config: &ExtractConfig) -> PageFetcher {
        PageFetcher::new(fake, config)
    }

    #[tokio::test]
    async fn test_250_tasks_take_three_pages() {
        let fake = Arc::new(FakeClickUp::new());
        fake.add_tasks("L1", false, 250);
        let fetcher = fetcher(fake.clone(), &ExtractConfig::default());

        let mut sizes = Vec::new();
        let mut page = 0;
        loop {
            let result = fetcher.fetch("L1", false, page).await.unwrap();
            sizes.push(result.tasks.len());
            if !result.has_more {
                break;
            }
            page += 1;
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(fake.task_page_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_an_empty_probe() {
        let fake = Arc::new(FakeClickUp::new());
        fake.add_tasks("L1", false, 100);
        let fetcher = fetcher(fake, &ExtractConfig::default());

        assert!(fetcher.fetch("L1", false, 0).await.unwrap().has_more);
        let second = fetcher.fetch("L1", false, 1).await.unwrap();
        assert!(second.tasks.is_empty());
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_last_page_flag_ends_a_full_page() {
        let fake = Arc::new(FakeClickUp::new().with_last_page_hint());
        fake.add_tasks("L1", false, 100);
        fake.add_tasks("L2", false, 150);
        let fetcher = fetcher(fake.clone(), &ExtractConfig::default());

        let only = fetcher.fetch("L1", false, 0).await.unwrap();
        assert_eq!(only.tasks.len(), 100);
        assert!(!only.has_more);

        assert!(fetcher.fetch("L2", false, 0).await.unwrap().has_more);
        assert!(!fetcher.fetch("L2", false, 1).await.unwrap().has_more);
        assert_eq!(fake.task_page_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_page_ceiling_stops_a_runaway_list() {
        let fake = Arc::new(FakeClickUp::new().with_page_size(1));
        fake.add_tasks("L1", false, 10);
        let config = ExtractConfig {
            page_size: 1,
            max_pages_per_list: 3,
            ..ExtractConfig::default()
        };
        let fetcher = fetcher(fake.clone(), &config);

        assert!(fetcher.fetch("L1", false, 1).await.unwrap().has_more);
        assert!(!fetcher.fetch("L1", false, 2).await.unwrap().has_more);
        assert!(fetcher.fetch("L1", false, 3).await.unwrap().tasks.is_empty());
        // Page 3 was refused without a remote call
        assert_eq!(fake.task_page_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failures() {
        let fake = Arc::new(FakeClickUp::new());
        fake.add_tasks("L1", false, 5);
        fake.fail_next(
            FakeEndpoint::Tasks("L1".to_string()),
            vec![
                FetchError::RateLimited,
                FetchError::Network {
                    message: "reset".to_string(),
                },
            ],
        );
        let fetcher = fetcher(fake.clone(), &ExtractConfig::default());

        let page = fetcher.fetch("L1", false, 0).await.unwrap();
        assert_eq!(page.tasks.len(), 5);
        assert_eq!(fake.task_page_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_the_error() {
        let fake = Arc::new(FakeClickUp::new());
        let error = FetchError::Http {
            status: 500,
            message: "boom".to_string(),
        };
        fake.fail_always(FakeEndpoint::Tasks("L1".to_string()), error.clone());
        let fetcher = fetcher(fake.clone(), &ExtractConfig::default());

        assert_eq!(fetcher.fetch("L1", false, 0).await.unwrap_err(), error);
        assert_eq!(fake.task_page_calls().len(), 3);
    }
}
