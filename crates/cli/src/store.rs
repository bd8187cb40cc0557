//! JSON Lines article store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mph::{Article, ArticleStore, HarvestError, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Articles kept one JSON object per line, rewritten on every change.
#[derive(Debug)]
pub struct JsonlArticleStore {
	path: PathBuf,
	articles: Mutex<Vec<Article>>,
}

fn store_err(path: &Path, err: impl std::fmt::Display) -> HarvestError {
	HarvestError::Store(format!("{}: {err}", path.display()))
}

impl JsonlArticleStore {
	/// Loads `path` when it exists. Lines that do not parse are skipped.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let mut articles = Vec::new();
		match tokio::fs::read_to_string(&path).await {
			Ok(raw) => {
				for (n, line) in raw.lines().enumerate() {
					if line.trim().is_empty() {
						continue;
					}
					match serde_json::from_str::<Article>(line) {
						Ok(article) => articles.push(article),
						Err(err) => warn!(target = "mph.store", path = %path.display(), line = n + 1, error = %err, "skipping unreadable article"),
					}
				}
			}
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
			Err(err) => return Err(store_err(&path, err)),
		}
		debug!(target = "mph.store", path = %path.display(), count = articles.len(), "article store opened");
		Ok(Self {
			path,
			articles: Mutex::new(articles),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn articles(&self) -> Vec<Article> {
		self.articles.lock().await.clone()
	}

	async fn write_all(&self, articles: &[Article]) -> Result<()> {
		let mut out = String::new();
		for article in articles {
			out.push_str(&serde_json::to_string(article)?);
			out.push('\n');
		}
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await.map_err(|e| store_err(&self.path, e))?;
		}
		let tmp = self.path.with_extension("jsonl.tmp");
		tokio::fs::write(&tmp, out).await.map_err(|e| store_err(&tmp, e))?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(|e| store_err(&self.path, e))?;
		Ok(())
	}
}

#[async_trait]
impl ArticleStore for JsonlArticleStore {
	async fn upsert(&self, article: &Article, check_exist: bool) -> Result<bool> {
		let mut articles = self.articles.lock().await;
		match articles.iter().position(|a| a.id == article.id) {
			Some(_) if check_exist => return Ok(false),
			Some(i) => articles[i] = article.clone(),
			None => articles.push(article.clone()),
		}
		self.write_all(&articles).await?;
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn article(id: &str, title: &str) -> Article {
		Article {
			id: id.into(),
			url: format!("https://mp.weixin.qq.com/s/{id}"),
			title: title.into(),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn upsert_persists_and_reopens() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("out").join("articles.jsonl");

		let store = JsonlArticleStore::open(&path).await.unwrap();
		assert!(store.upsert(&article("a", "first"), true).await.unwrap());
		assert!(store.upsert(&article("b", "second"), true).await.unwrap());
		assert!(!store.upsert(&article("a", "again"), true).await.unwrap());

		let reopened = JsonlArticleStore::open(&path).await.unwrap();
		let titles: Vec<_> = reopened.articles().await.into_iter().map(|a| a.title).collect();
		assert_eq!(titles, vec!["first", "second"]);
		assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
	}

	#[tokio::test]
	async fn replace_keeps_position() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("articles.jsonl");
		let store = JsonlArticleStore::open(&path).await.unwrap();
		store.upsert(&article("a", "one"), false).await.unwrap();
		store.upsert(&article("b", "two"), false).await.unwrap();
		assert!(store.upsert(&article("a", "uno"), false).await.unwrap());

		let articles = store.articles().await;
		assert_eq!(articles.len(), 2);
		assert_eq!(articles[0].title, "uno");
	}

	#[tokio::test]
	async fn corrupt_lines_are_skipped() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("articles.jsonl");
		let good = serde_json::to_string(&article("a", "kept")).unwrap();
		std::fs::write(&path, format!("{good}\nnot json\n\n")).unwrap();

		let store = JsonlArticleStore::open(&path).await.unwrap();
		assert_eq!(store.articles().await.len(), 1);
	}
}
