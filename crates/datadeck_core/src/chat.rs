//! Chat over registered data: classify the message, then answer with
//! prose, a read-only SQL result, or a plot.
//!
//! Generated and user-supplied SQL both pass through [`is_read_only_sql`]
//! before execution; the chat surface never mutates tables.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};
use crate::llm::LlmBackend;
use crate::plots::{PlotDescriptor, PlotStore};
use crate::query::{QueryGateway, QueryResult};
use crate::registry::{TableMeta, TableRegistry};
use crate::summary::{SummaryEngine, SummaryMode, FALLBACK_PROVIDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatIntent {
    Question,
    Sql,
    Graph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatReply {
    Text { text: String },
    Sql { sql: String, result: QueryResult },
    Plot { text: String, plots: Vec<PlotDescriptor> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub intent: ChatIntent,
    pub reply: ChatReply,
    pub provider: String,
}

pub struct ChatEngine {
    registry: Arc<TableRegistry>,
    gateway: Arc<QueryGateway>,
    plots: Arc<PlotStore>,
    summary: SummaryEngine,
    llm: Option<Arc<dyn LlmBackend>>,
}

impl ChatEngine {
    pub fn new(
        registry: Arc<TableRegistry>,
        gateway: Arc<QueryGateway>,
        plots: Arc<PlotStore>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        let summary = SummaryEngine::new(registry.clone(), gateway.clone(), llm.clone());
        Self {
            registry,
            gateway,
            plots,
            summary,
            llm,
        }
    }

    pub async fn respond(&self, message: &str) -> Result<ChatOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DeckError::InvalidParams("empty chat message".to_string()));
        }
        let intent = classify_intent(message);
        debug!(?intent, "classified chat message");
        match intent {
            ChatIntent::Sql => self.answer_sql(message).await,
            ChatIntent::Graph => self.answer_graph(message),
            ChatIntent::Question => self.answer_question(message).await,
        }
    }

    async fn answer_sql(&self, message: &str) -> Result<ChatOutcome> {
        let (sql, provider) = if let Some(literal) = extract_sql(message) {
            (literal, FALLBACK_PROVIDER.to_string())
        } else if let Some(llm) = &self.llm {
            let context = self.schema_context()?;
            let prompt = format!(
                "{context}\nWrite a single read-only DuckDB SELECT statement answering: \
                 {message}\nReply with only the SQL."
            );
            let response = llm.chat(SQL_SYSTEM_PROMPT, &prompt).await?;
            let sql = extract_sql(&response).ok_or_else(|| {
                DeckError::InvalidParams("model did not produce a SQL statement".to_string())
            })?;
            (sql, llm.name().to_string())
        } else {
            return Ok(ChatOutcome {
                intent: ChatIntent::Sql,
                reply: ChatReply::Text {
                    text: "No model is configured; send the SQL statement itself and it \
                           will be executed directly."
                        .to_string(),
                },
                provider: FALLBACK_PROVIDER.to_string(),
            });
        };

        if !is_read_only_sql(&sql) {
            // Refused, not an error: the reply explains the safeguard.
            return Ok(ChatOutcome {
                intent: ChatIntent::Sql,
                reply: ChatReply::Text {
                    text: "That statement would modify data. Chat only runs read-only \
                           SELECT queries; use the query endpoint for writes."
                        .to_string(),
                },
                provider,
            });
        }
        let result = self.gateway.execute(&sql)?;
        Ok(ChatOutcome {
            intent: ChatIntent::Sql,
            reply: ChatReply::Sql { sql, result },
            provider,
        })
    }

    fn answer_graph(&self, message: &str) -> Result<ChatOutcome> {
        let meta = self.target_table(message)?;
        let sample = self
            .gateway
            .execute(&format!("SELECT * FROM \"{}\" LIMIT 200", meta.name))?;
        let plots = if sample.rows.is_empty() {
            Vec::new()
        } else {
            let batch = TabularBatch::from_objects(sample.rows)?;
            self.plots.generate(&meta.name, &batch)?
        };
        if plots.is_empty() {
            return Ok(ChatOutcome {
                intent: ChatIntent::Graph,
                reply: ChatReply::Text {
                    text: format!(
                        "No plottable columns were found in table '{}'.",
                        meta.name
                    ),
                },
                provider: FALLBACK_PROVIDER.to_string(),
            });
        }
        let text = format!(
            "Generated {} plot(s) from table '{}'.",
            plots.len(),
            meta.name
        );
        Ok(ChatOutcome {
            intent: ChatIntent::Graph,
            reply: ChatReply::Plot { text, plots },
            provider: FALLBACK_PROVIDER.to_string(),
        })
    }

    /// Analytic questions go through the summary path against the table
    /// the message names (or the most recent one).
    async fn answer_question(&self, message: &str) -> Result<ChatOutcome> {
        let tables = self.registry.list()?;
        if tables.is_empty() {
            return Ok(ChatOutcome {
                intent: ChatIntent::Question,
                reply: ChatReply::Text {
                    text: "No tables are loaded yet. Upload a file or pull a public \
                           dataset first."
                        .to_string(),
                },
                provider: FALLBACK_PROVIDER.to_string(),
            });
        }

        if let Some(llm) = &self.llm {
            let context = self.schema_context()?;
            let prompt = format!("{context}\nQuestion: {message}");
            match llm.chat(QUESTION_SYSTEM_PROMPT, &prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(ChatOutcome {
                        intent: ChatIntent::Question,
                        reply: ChatReply::Text {
                            text: text.trim().to_string(),
                        },
                        provider: llm.name().to_string(),
                    });
                }
                Ok(_) => warn!("model returned an empty chat answer"),
                Err(e) => warn!(error = %e, "model chat answer failed"),
            }
        }

        let target = self.target_table(message)?;
        let outcome = self
            .summary
            .summarize(&target.name, SummaryMode::Overview, None)
            .await?;
        Ok(ChatOutcome {
            intent: ChatIntent::Question,
            reply: ChatReply::Text {
                text: outcome.summary,
            },
            provider: outcome.provider,
        })
    }

    /// Table named in the message, else the most recently registered one.
    fn target_table(&self, message: &str) -> Result<TableMeta> {
        let lowered = message.to_lowercase();
        for meta in self.registry.list()? {
            if lowered.contains(&meta.name.to_lowercase()) {
                return Ok(meta);
            }
        }
        self.registry
            .most_recent()?
            .ok_or_else(|| DeckError::TableNotFound("no tables are loaded".to_string()))
    }

    fn schema_context(&self) -> Result<String> {
        let tables = self.registry.list()?;
        let mut context = String::from("Available tables:\n");
        for t in &tables {
            let cols: Vec<String> = t
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            context.push_str(&format!(
                "- {} ({} rows): {}\n",
                t.name,
                t.row_count,
                cols.join(", ")
            ));
        }
        Ok(context)
    }
}

const SQL_SYSTEM_PROMPT: &str = "You translate questions about tabular data into a single \
read-only DuckDB SELECT statement. Never write statements that modify data.";

const QUESTION_SYSTEM_PROMPT: &str = "You answer questions about the user's loaded tables, \
grounded only in the schema information provided.";

const GRAPH_KEYWORDS: &[&str] = &[
    "plot", "chart", "graph", "visualize", "visualise", "histogram", "draw",
];

/// Route a message to its handling path without calling a model.
pub fn classify_intent(message: &str) -> ChatIntent {
    if extract_sql(message).is_some() {
        return ChatIntent::Sql;
    }
    let lowered = message.to_lowercase();
    if GRAPH_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return ChatIntent::Graph;
    }
    if SQLISH_PHRASES.iter().any(|k| lowered.contains(k)) {
        return ChatIntent::Sql;
    }
    ChatIntent::Question
}

const SQLISH_PHRASES: &[&str] = &[
    "how many",
    "average",
    "count of",
    "sum of",
    "top ",
    "group by",
    "maximum",
    "minimum",
];

/// Pull a SQL statement out of a message: either a fenced code block or a
/// message that itself starts with a query keyword.
pub fn extract_sql(message: &str) -> Option<String> {
    let fenced = if message.contains("```sql") {
        message
            .split("```sql")
            .nth(1)
            .and_then(|s| s.split("```").next())
    } else if message.contains("```") {
        message.split("```").nth(1)
    } else {
        None
    };
    if let Some(block) = fenced {
        let block = block.trim();
        if !block.is_empty() {
            return Some(block.trim_end_matches(';').trim().to_string());
        }
    }

    let trimmed = message.trim();
    let first = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if matches!(first.as_str(), "select" | "with" | "show" | "describe" | "explain") {
        return Some(trimmed.trim_end_matches(';').trim().to_string());
    }
    None
}

static WRITE_KEYWORDS: OnceLock<regex::Regex> = OnceLock::new();

/// One statement, starting with a read keyword, containing no write
/// keywords anywhere.
pub fn is_read_only_sql(sql: &str) -> bool {
    let sql = sql.trim().trim_end_matches(';');
    if sql.contains(';') {
        return false;
    }
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if !matches!(first.as_str(), "select" | "with" | "show" | "describe" | "explain") {
        return false;
    }
    let re = WRITE_KEYWORDS.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\b(insert|update|delete|drop|alter|create|truncate|attach|detach|copy|replace|merge|install|load|call|set|export|import)\b",
        )
        .unwrap()
    });
    !re.is_match(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TabularBatch;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine() -> (TempDir, ChatEngine) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("deck.db");
        let registry = Arc::new(TableRegistry::new(&db).unwrap());
        let batch = TabularBatch::from_rows(
            vec!["city".to_string(), "pop".to_string()],
            vec![
                vec![json!("paris"), json!(2_100_000)],
                vec![json!("lyon"), json!(520_000)],
            ],
        )
        .unwrap();
        registry.register("cities", "cities.csv", &batch).unwrap();
        let gateway = Arc::new(QueryGateway::new(&db));
        let plots = Arc::new(PlotStore::new(dir.path().join("plots")).unwrap());
        (dir, ChatEngine::new(registry, gateway, plots, None))
    }

    #[test]
    fn intent_classification_paths() {
        assert_eq!(classify_intent("SELECT * FROM cities"), ChatIntent::Sql);
        assert_eq!(classify_intent("how many rows are there?"), ChatIntent::Sql);
        assert_eq!(classify_intent("plot the population"), ChatIntent::Graph);
        assert_eq!(classify_intent("what is this data about?"), ChatIntent::Question);
    }

    #[test]
    fn sql_extraction_handles_fences_and_literals() {
        assert_eq!(
            extract_sql("```sql\nSELECT 1;\n```").as_deref(),
            Some("SELECT 1")
        );
        assert_eq!(
            extract_sql("select city from cities;").as_deref(),
            Some("select city from cities")
        );
        assert!(extract_sql("tell me about the data").is_none());
    }

    #[test]
    fn read_only_guard() {
        assert!(is_read_only_sql("SELECT * FROM cities"));
        assert!(is_read_only_sql("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(!is_read_only_sql("DROP TABLE cities"));
        assert!(!is_read_only_sql("SELECT 1; DROP TABLE cities"));
        assert!(!is_read_only_sql("CREATE TABLE x AS SELECT 1"));
        assert!(!is_read_only_sql("select * from cities; delete from cities"));
    }

    #[tokio::test]
    async fn literal_sql_messages_execute_read_only() {
        let (_dir, engine) = engine();
        let outcome = engine
            .respond("SELECT pop FROM cities ORDER BY pop DESC")
            .await
            .unwrap();
        assert_eq!(outcome.intent, ChatIntent::Sql);
        match outcome.reply {
            ChatReply::Sql { result, .. } => {
                assert_eq!(result.rows[0]["pop"], json!(2_100_000));
            }
            other => panic!("expected SQL reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_statements_are_refused_with_an_explanation() {
        let (_dir, engine) = engine();
        // A fenced write statement routes to the SQL path, where the
        // read-only guard turns it into a refusal reply.
        let outcome = engine
            .respond("```sql\nDROP TABLE cities\n```")
            .await
            .unwrap();
        match outcome.reply {
            ChatReply::Text { text } => assert!(text.contains("read-only")),
            other => panic!("expected refusal text, got {other:?}"),
        }
        assert!(engine.registry.exists("cities").unwrap());
    }

    #[tokio::test]
    async fn graph_requests_produce_plots() {
        let (_dir, engine) = engine();
        let outcome = engine.respond("plot the cities data").await.unwrap();
        assert_eq!(outcome.intent, ChatIntent::Graph);
        match outcome.reply {
            ChatReply::Plot { plots, .. } => assert!(!plots.is_empty()),
            other => panic!("expected plot reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn questions_without_a_model_get_a_deterministic_overview() {
        let (_dir, engine) = engine();
        let outcome = engine.respond("what is this data about?").await.unwrap();
        assert_eq!(outcome.provider, FALLBACK_PROVIDER);
        match outcome.reply {
            ChatReply::Text { text } => assert!(text.contains("cities")),
            other => panic!("expected text reply, got {other:?}"),
        }
    }
}
