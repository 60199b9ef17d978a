use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use askdb::config::{ProviderSettings, Settings};
use askdb::connection::{ConnectionProvider, QueryResult};
use askdb::llm::{
    ClaudeClient, ExplanationResponse, LlmError, LlmProvider, LlmResult, ParseOutcome, PromptedProvider,
};
use askdb::metadata::{MetadataStore, MetadataStoreExt, NewDatabaseTarget, SqliteMetadataStore, TargetConnection};
use askdb::query::{
    AnalyzeRequest, ExecuteRequest, GenerateRequest, ProcessStage, QueryService, QueryWorkflowState,
    ViewingType, WorkflowStage,
};
use askdb::schema::{AdminTerms, SchemaSynchronizer};
use askdb::ErrorKind;

#[derive(Default)]
struct MockLlm {
    explanation_calls: AtomicUsize,
    sql_calls: AtomicUsize,
    result_calls: AtomicUsize,
    sql: String,
    fail_sql: bool,
    schema_seen: Mutex<Option<String>>,
    resolutions_seen: Mutex<BTreeMap<String, String>>,
}

impl MockLlm {
    fn answering(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            ..Default::default()
        }
    }

    fn calls(&self) -> (usize, usize, usize) {
        (
            self.explanation_calls.load(Ordering::SeqCst),
            self.sql_calls.load(Ordering::SeqCst),
            self.result_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_explanation(
        &self,
        _question: &str,
        schema_text: &str,
        _admin_terms: &AdminTerms,
    ) -> LlmResult<ParseOutcome> {
        self.explanation_calls.fetch_add(1, Ordering::SeqCst);
        *self.schema_seen.lock().unwrap() = Some(schema_text.to_string());

        Ok(ParseOutcome::Parsed(ExplanationResponse {
            explanation: "Count every row in orders.".to_string(),
            has_ambiguities: true,
            ambiguities: BTreeMap::from([(
                "orders".to_string(),
                vec!["all orders".to_string(), "paid orders".to_string()],
            )]),
            confidence_score: 0.7,
            ..Default::default()
        }))
    }

    async fn generate_sql(
        &self,
        _question: &str,
        _confirmed_understanding: &str,
        _schema_text: &str,
        resolved_ambiguities: &BTreeMap<String, String>,
    ) -> LlmResult<String> {
        self.sql_calls.fetch_add(1, Ordering::SeqCst);
        *self.resolutions_seen.lock().unwrap() = resolved_ambiguities.clone();
        if self.fail_sql {
            return Err(LlmError::ProviderStatus {
                provider: "mock".to_string(),
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        Ok(self.sql.clone())
    }

    async fn generate_result_explanation(
        &self,
        _question: &str,
        _sql: &str,
        result: &QueryResult,
    ) -> LlmResult<String> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} row(s) came back.", result.row_count()))
    }
}

const COUNT_SQL: &str = "SELECT COUNT(*) AS order_count FROM orders";

struct Fixture {
    _dir: TempDir,
    store: Arc<SqliteMetadataStore>,
    database_id: i64,
}

/// A live SQLite file registered in a fresh metadata store, schema synced.
async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE orders (
                 id INTEGER PRIMARY KEY,
                 customer_id INTEGER REFERENCES customers(id),
                 total REAL
             );
             INSERT INTO customers VALUES (1, 'Ada'), (2, 'Grace');
             INSERT INTO orders VALUES (1, 1, 19.5), (2, 1, 5.0), (3, 2, 1200.25);",
        )
        .unwrap();
    }

    let store = Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
    let database_id = store
        .add_database_target(NewDatabaseTarget {
            name: "Shop".to_string(),
            engine_type_id: 4,
            connection: TargetConnection {
                host: path.to_str().unwrap().to_string(),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    let target = store.require_active_target(database_id).await.unwrap();
    SchemaSynchronizer::new(store.clone())
        .introspect_and_sync(&ConnectionProvider::from_settings(&Settings::default()), &target)
        .await
        .unwrap();

    Fixture {
        _dir: dir,
        store,
        database_id,
    }
}

fn service(fixture: &Fixture, llm: Arc<dyn LlmProvider>) -> QueryService {
    QueryService::new(
        fixture.store.clone(),
        llm,
        ConnectionProvider::from_settings(&Settings::default()),
    )
}

#[tokio::test]
async fn test_analyze_uses_synced_schema() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());

    let analysis = queries
        .analyze(&AnalyzeRequest::new("How many orders?", fixture.database_id))
        .await;

    assert!(analysis.success, "{:?}", analysis.failure);
    assert_eq!(analysis.explanation, "Count every row in orders.");
    assert!(analysis.has_ambiguities);
    assert_eq!(analysis.question, "How many orders?");
    assert!(!analysis.degraded);
    assert_eq!(llm.calls(), (1, 0, 0));

    let schema = llm.schema_seen.lock().unwrap().clone().unwrap();
    assert!(schema.contains("Table: orders"));
    assert!(schema.contains("many-to-one: orders.customer_id -> customers.id"));

    let json = serde_json::to_value(&analysis).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["confidenceScore"], 0.7);
    assert!(json.get("errorMessage").is_none());
}

#[tokio::test]
async fn test_analyze_rejects_missing_inputs_without_calling_provider() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());

    let analysis = queries.analyze(&AnalyzeRequest::new("   ", fixture.database_id)).await;
    assert!(!analysis.success);
    assert_eq!(analysis.failure.error_kind, Some(ErrorKind::InvalidArgument));
    assert_eq!(analysis.failure.error_message.as_deref(), Some("question is required"));

    let analysis = queries
        .analyze(&AnalyzeRequest {
            question: "How many orders?".to_string(),
            database_id: None,
        })
        .await;
    assert!(!analysis.success);
    assert_eq!(analysis.failure.error_kind, Some(ErrorKind::InvalidArgument));

    let analysis = queries
        .analyze(&AnalyzeRequest::new("How many orders?", fixture.database_id + 10))
        .await;
    assert!(!analysis.success);
    assert_eq!(analysis.failure.error_kind, Some(ErrorKind::NotFound));

    assert_eq!(llm.calls(), (0, 0, 0));
}

#[tokio::test]
async fn test_generate_requires_confirmed_understanding() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());

    let generated = queries
        .generate(&GenerateRequest {
            original_question: "How many orders?".to_string(),
            database_id: Some(fixture.database_id),
            confirmed_understanding: String::new(),
            resolved_ambiguities: BTreeMap::new(),
        })
        .await;

    assert!(!generated.success);
    assert_eq!(generated.sql, None);
    assert_eq!(generated.original_question, "How many orders?");
    assert_eq!(generated.failure.error_kind, Some(ErrorKind::InvalidArgument));
    assert_eq!(llm.calls(), (0, 0, 0));

    let json = serde_json::to_value(&generated).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["errorKind"], "invalidArgument");
    assert_eq!(json["errorMessage"], "confirmed understanding is required");
}

#[tokio::test]
async fn test_generate_passes_resolutions() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());
    let resolved = BTreeMap::from([("orders".to_string(), "all orders".to_string())]);

    let generated = queries
        .generate(&GenerateRequest {
            original_question: "How many orders?".to_string(),
            database_id: Some(fixture.database_id),
            confirmed_understanding: "Count every row in orders.".to_string(),
            resolved_ambiguities: resolved.clone(),
        })
        .await;

    assert!(generated.success);
    assert_eq!(generated.sql.as_deref(), Some(COUNT_SQL));
    assert_eq!(generated.resolved_ambiguities, resolved);
    assert_eq!(*llm.resolutions_seen.lock().unwrap(), resolved);
}

#[tokio::test]
async fn test_provider_failure_during_generate() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm {
        fail_sql: true,
        ..Default::default()
    });
    let queries = service(&fixture, llm.clone());

    let generated = queries
        .generate(&GenerateRequest {
            original_question: "How many orders?".to_string(),
            database_id: Some(fixture.database_id),
            confirmed_understanding: "Count every row in orders.".to_string(),
            resolved_ambiguities: BTreeMap::new(),
        })
        .await;

    assert!(!generated.success);
    assert_eq!(generated.failure.error_kind, Some(ErrorKind::ProviderCallFailure));
    assert_eq!(
        generated.failure.error_message.as_deref(),
        Some("The language model provider request failed (HTTP 429)")
    );
    assert!(!generated.failure.retriable);
}

#[tokio::test]
async fn test_execute_classifies_and_explains() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());

    let executed = queries
        .execute(&ExecuteRequest {
            sql: COUNT_SQL.to_string(),
            database_id: Some(fixture.database_id),
            original_question: Some("How many orders?".to_string()),
        })
        .await;

    assert!(executed.success, "{:?}", executed.failure);
    assert_eq!(executed.viewing_type, ViewingType::Number);
    assert_eq!(executed.formatted_value.as_deref(), Some("3.00"));
    assert_eq!(executed.result_explanation.as_deref(), Some("1 row(s) came back."));
    assert_eq!(executed.row_count(), 1);
    assert_eq!(llm.calls(), (0, 0, 1));

    let json = serde_json::to_value(&executed).unwrap();
    assert_eq!(json["viewingType"], "number");
    assert_eq!(json["result"]["rows"][0]["order_count"], 3);
    assert_eq!(json["result"]["rowCount"], 1);
}

#[tokio::test]
async fn test_execute_without_question_skips_explanation() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());

    let executed = queries
        .execute(&ExecuteRequest {
            sql: "SELECT id, total FROM orders ORDER BY id".to_string(),
            database_id: Some(fixture.database_id),
            original_question: None,
        })
        .await;

    assert!(executed.success);
    assert_eq!(executed.viewing_type, ViewingType::Table);
    assert_eq!(executed.formatted_value, None);
    assert_eq!(executed.result_explanation, None);
    assert_eq!(executed.row_count(), 3);
    assert_eq!(llm.calls(), (0, 0, 0));
}

#[tokio::test]
async fn test_result_explanations_can_be_disabled() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone()).with_result_explanations(false);

    let executed = queries
        .execute(&ExecuteRequest {
            sql: "SELECT name FROM customers WHERE id = 2".to_string(),
            database_id: Some(fixture.database_id),
            original_question: Some("Who is customer 2?".to_string()),
        })
        .await;

    assert!(executed.success);
    assert_eq!(executed.viewing_type, ViewingType::Label);
    assert_eq!(executed.formatted_value.as_deref(), Some("Grace"));
    assert_eq!(executed.result_explanation, None);
    assert_eq!(llm.calls(), (0, 0, 0));
}

#[tokio::test]
async fn test_invalid_sql_echoes_statement() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());
    let sql = "SELECT nope FROM missing_table";

    let executed = queries
        .execute(&ExecuteRequest {
            sql: sql.to_string(),
            database_id: Some(fixture.database_id),
            original_question: Some("Anything?".to_string()),
        })
        .await;

    assert!(!executed.success);
    assert_eq!(executed.sql, sql);
    assert_eq!(executed.result, None);
    assert_eq!(executed.failure.error_kind, Some(ErrorKind::ExecutionFailure));
    assert!(executed
        .failure
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("missing_table")));
    assert_eq!(llm.calls(), (0, 0, 0));
}

#[tokio::test]
async fn test_execute_against_removed_database() {
    let fixture = fixture().await;
    let queries = service(&fixture, Arc::new(MockLlm::answering(COUNT_SQL)));
    fixture
        .store
        .deactivate_database_target(fixture.database_id)
        .await
        .unwrap();

    let executed = queries
        .execute(&ExecuteRequest {
            sql: COUNT_SQL.to_string(),
            database_id: Some(fixture.database_id),
            original_question: None,
        })
        .await;

    assert!(!executed.success);
    assert_eq!(executed.failure.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_two_step_workflow() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering(COUNT_SQL));
    let queries = service(&fixture, llm.clone());

    let analysis = queries
        .analyze(&AnalyzeRequest::new("How many orders?", fixture.database_id))
        .await;
    let mut state = QueryWorkflowState::from_analysis(&analysis).unwrap();
    assert_eq!(state.unresolved(), vec!["orders"]);

    let generate = state
        .confirm(
            &analysis.explanation,
            BTreeMap::from([("orders".to_string(), "all orders".to_string())]),
        )
        .unwrap();
    assert!(state.unresolved().is_empty());

    let generated = queries.generate(&generate).await;
    let execute = state.record_sql(&generated).unwrap();
    assert_eq!(state.stage, WorkflowStage::SqlGenerated);

    let executed = queries.execute(&execute).await;
    state.record_execution(&executed).unwrap();

    assert_eq!(state.stage, WorkflowStage::Executed);
    assert_eq!(executed.formatted_value.as_deref(), Some("3.00"));
    assert_eq!(llm.calls(), (1, 1, 1));
}

#[tokio::test]
async fn test_process_runs_every_stage() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm::answering("SELECT SUM(total) AS revenue FROM orders"));
    let queries = service(&fixture, llm.clone());

    let combined = queries
        .process(&AnalyzeRequest::new("What is our revenue?", fixture.database_id))
        .await;

    assert!(combined.success(), "{:?}", combined.execution.failure);
    assert_eq!(combined.failed_stage, None);
    assert_eq!(combined.explanation, "Count every row in orders.");
    assert_eq!(combined.execution.sql, "SELECT SUM(total) AS revenue FROM orders");
    assert_eq!(combined.execution.formatted_value.as_deref(), Some("1,224.75"));
    assert_eq!(llm.calls(), (1, 1, 1));
    // Auto-confirmation resolves nothing.
    assert!(llm.resolutions_seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_process_reports_failed_stage() {
    let fixture = fixture().await;
    let llm = Arc::new(MockLlm {
        fail_sql: true,
        ..Default::default()
    });
    let queries = service(&fixture, llm.clone());

    let combined = queries
        .process(&AnalyzeRequest::new("How many orders?", fixture.database_id))
        .await;

    assert!(!combined.success());
    assert_eq!(combined.failed_stage, Some(ProcessStage::Generate));
    assert_eq!(combined.explanation, "Count every row in orders.");
    assert_eq!(combined.execution.failure.error_kind, Some(ErrorKind::ProviderCallFailure));
    assert_eq!(llm.calls(), (1, 1, 0));

    let json = serde_json::to_value(&combined).unwrap();
    assert_eq!(json["failedStage"], "generate");
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_unreachable_provider_fails_analyze_cleanly() {
    let fixture = fixture().await;

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = ProviderSettings {
        api_key: "test-key".to_string(),
        endpoint: Some(format!("http://{}/v1/messages", addr)),
        ..Default::default()
    };
    let claude = ClaudeClient::new("test-key".to_string(), &settings, Duration::from_secs(5)).unwrap();
    let queries = service(&fixture, Arc::new(PromptedProvider::new(claude)));

    let analysis = queries
        .analyze(&AnalyzeRequest::new("How many orders?", fixture.database_id))
        .await;

    assert!(!analysis.success);
    assert_eq!(analysis.failure.error_kind, Some(ErrorKind::ProviderCallFailure));
    assert!(analysis.failure.error_message.is_some_and(|m| !m.is_empty()));
    assert_eq!(analysis.question, "How many orders?");
}
