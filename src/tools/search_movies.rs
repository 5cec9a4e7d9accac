//! 电影检索工具：相似度检索与随机抽样
//!
//! MovieIndex 为内容库的检索抽象（生产侧为数据库向量索引）；
//! InMemoryMovieIndex 用关键词重叠近似相似度，供测试与本地运行。
//! 检索零结果是合法的空结果，不是错误。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::tokenizer::{overlap_score, tokenize_to_set};
use crate::tools::{json_schema_of, Tool, ToolContext};

/// 内容库中的一部电影
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Movie {
    pub title: String,
    pub released: i32,
    pub runtime_mins: Option<i32>,
    pub genres: String,
    pub rating: f32,
    pub actors: String,
    pub director: String,
    pub plot: String,
    /// 海报资源名（签名 URL 由外部媒体层负责）
    pub poster: String,
    /// 用于检索的拼接文本
    pub content: String,
}

/// 电影索引 trait：相似度检索与随机抽样
#[async_trait]
pub trait MovieIndex: Send + Sync {
    /// 按查询文本检索最相关的 top_k 部电影（降序）
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Movie>, String>;

    /// 抽样 n 部电影（发现场景用）
    async fn sample(&self, n: usize) -> Result<Vec<Movie>, String>;
}

/// 进程内索引：关键词重叠打分
#[derive(Default)]
pub struct InMemoryMovieIndex {
    movies: Vec<Movie>,
}

impl InMemoryMovieIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_movies(movies: Vec<Movie>) -> Self {
        Self { movies }
    }
}

#[async_trait]
impl MovieIndex for InMemoryMovieIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Movie>, String> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, &Movie)> = self
            .movies
            .iter()
            .map(|movie| {
                let doc = format!(
                    "{} {} {} {} {} {}",
                    movie.title, movie.genres, movie.actors, movie.director, movie.plot,
                    movie.content
                );
                (overlap_score(&query_tokens, &tokenize_to_set(&doc)), movie)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(top_k).map(|(_, m)| m.clone()).collect())
    }

    async fn sample(&self, n: usize) -> Result<Vec<Movie>, String> {
        // 简单截取，无需真随机
        Ok(self.movies.iter().take(n).cloned().collect())
    }
}

/// search_movies 的参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMoviesArgs {
    /// 用户的查询文本
    pub query_text: String,
}

/// 相似度检索工具：按查询文本返回排序后的电影列表
pub struct SearchMoviesTool {
    index: Arc<dyn MovieIndex>,
    top_k: usize,
}

impl SearchMoviesTool {
    pub fn new(index: Arc<dyn MovieIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }
}

#[async_trait]
impl Tool for SearchMoviesTool {
    fn name(&self) -> &str {
        "search_movies"
    }

    fn description(&self) -> &str {
        "Performs a similarity search for movies in the content store. Args: {\"query_text\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        json_schema_of::<SearchMoviesArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        let args: SearchMoviesArgs =
            serde_json::from_value(args).map_err(|e| e.to_string())?;
        let movies = self.index.search(&args.query_text, self.top_k).await?;
        tracing::debug!(query = %args.query_text, hits = movies.len(), "movie search");
        serde_json::to_value(movies).map_err(|e| e.to_string())
    }
}

/// 随机电影工具：返回若干部电影的标题与海报
pub struct RandomMoviesTool {
    index: Arc<dyn MovieIndex>,
    n: usize,
}

impl RandomMoviesTool {
    pub fn new(index: Arc<dyn MovieIndex>, n: usize) -> Self {
        Self { index, n }
    }
}

#[async_trait]
impl Tool for RandomMoviesTool {
    fn name(&self) -> &str {
        "get_random_movies"
    }

    fn description(&self) -> &str {
        "Retrieves a few movies from the content store for discovery. No args."
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        let movies = self.index.sample(self.n).await?;
        let items: Vec<Value> = movies
            .into_iter()
            .map(|m| serde_json::json!({ "title": m.title, "poster": m.poster }))
            .collect();
        Ok(Value::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;
    use serde_json::json;

    pub(crate) fn movie(title: &str, plot: &str, genres: &str) -> Movie {
        Movie {
            title: title.to_string(),
            released: 1979,
            runtime_mins: Some(117),
            genres: genres.to_string(),
            rating: 8.5,
            actors: "Sigourney Weaver".to_string(),
            director: "Ridley Scott".to_string(),
            plot: plot.to_string(),
            poster: "poster.png".to_string(),
            content: format!("{} {} {}", title, plot, genres),
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("movie-guru", "user-1", "session-1"))
    }

    #[tokio::test]
    async fn test_search_ranks_matches() {
        let index = InMemoryMovieIndex::with_movies(vec![
            movie("Alien", "A crew encounters a deadly alien creature", "sci-fi horror"),
            movie("Notting Hill", "A bookshop owner falls in love", "romantic comedy"),
        ]);
        let hits = index.search("deadly alien creature", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Alien");
    }

    #[tokio::test]
    async fn test_search_zero_results_is_empty_not_error() {
        let tool = SearchMoviesTool::new(Arc::new(InMemoryMovieIndex::new()), 5);
        let result = tool
            .execute(json!({"query_text": "anything"}), &ctx())
            .await
            .unwrap();
        assert_eq!(result, json!([]));
    }

    #[tokio::test]
    async fn test_random_movies_shape() {
        let index = InMemoryMovieIndex::with_movies(vec![movie("Alien", "plot", "sci-fi")]);
        let tool = RandomMoviesTool::new(Arc::new(index), 3);
        let result = tool.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(result[0]["title"], "Alien");
        assert!(result[0]["poster"].is_string());
    }
}
