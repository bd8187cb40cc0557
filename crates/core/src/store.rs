//! Article sink seam.

use async_trait::async_trait;
use mph_protocol::Article;
use parking_lot::Mutex;

use crate::error::Result;

/// Destination for fetched articles.
#[async_trait]
pub trait ArticleStore: Send + Sync {
	/// Inserts or updates `article`. With `check_exist` an already stored id is
	/// left alone and reported as `Ok(false)`.
	async fn upsert(&self, article: &Article, check_exist: bool) -> Result<bool>;
}

/// Keeps articles in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryArticleStore {
	articles: Mutex<Vec<Article>>,
}

impl MemoryArticleStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn articles(&self) -> Vec<Article> {
		self.articles.lock().clone()
	}
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
	async fn upsert(&self, article: &Article, check_exist: bool) -> Result<bool> {
		let mut articles = self.articles.lock();
		match articles.iter_mut().find(|a| a.id == article.id) {
			Some(_) if check_exist => Ok(false),
			Some(existing) => {
				*existing = article.clone();
				Ok(true)
			}
			None => {
				articles.push(article.clone());
				Ok(true)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn article(id: &str, title: &str) -> Article {
		Article {
			id: id.into(),
			title: title.into(),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn check_exist_keeps_first_copy() {
		let store = MemoryArticleStore::new();
		assert!(store.upsert(&article("a", "one"), true).await.unwrap());
		assert!(!store.upsert(&article("a", "two"), true).await.unwrap());
		assert_eq!(store.articles()[0].title, "one");

		assert!(store.upsert(&article("a", "three"), false).await.unwrap());
		assert_eq!(store.articles().len(), 1);
		assert_eq!(store.articles()[0].title, "three");
	}
}
