//! Question → SQL → scalar reply.

use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::query::executor::ScalarExecutor;
use crate::query::format::format_scalar;
use crate::query::sanitize::sanitize_sql;
use crate::query::translator::SqlTranslator;

/// Fixed replies for the two failure paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessages {
    pub translation_failed: String,
    pub execution_failed: String,
}

impl Default for ReplyMessages {
    fn default() -> Self {
        Self {
            translation_failed: "❌ Ошибка обработки запроса".to_string(),
            execution_failed: "❌ Ошибка выполнения запроса".to_string(),
        }
    }
}

pub struct QueryPipeline<T, E> {
    translator: T,
    executor: E,
    messages: ReplyMessages,
}

impl<T: SqlTranslator, E: ScalarExecutor> QueryPipeline<T, E> {
    pub fn new(translator: T, executor: E) -> Self {
        Self::with_messages(translator, executor, ReplyMessages::default())
    }

    pub fn with_messages(translator: T, executor: E, messages: ReplyMessages) -> Self {
        Self {
            translator,
            executor,
            messages,
        }
    }

    pub fn messages(&self) -> &ReplyMessages {
        &self.messages
    }

    /// Answer one question. Always produces a reply: the scalar, `"0"`, or
    /// one of the fixed failure messages.
    pub async fn handle(&self, question: &str) -> String {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("question", %request_id);
        self.answer(question.trim()).instrument(span).await
    }

    async fn answer(&self, question: &str) -> String {
        let sql = match self.translator.translate(question).await {
            Some(raw) => sanitize_sql(&raw),
            None => String::new(),
        };
        if sql.is_empty() {
            warn!("No SQL produced for '{}'", question);
            return self.messages.translation_failed.clone();
        }

        match self.executor.fetch_scalar(&sql).await {
            Ok(value) => {
                let reply = format_scalar(value.as_deref());
                info!("Question: '{}' → SQL: '{}' → Result: {}", question, sql, reply);
                reply
            }
            Err(e) => {
                error!("Query failed for '{}' (SQL: '{}'): {}", question, sql, e);
                self.messages.execution_failed.clone()
            }
        }
    }
}
