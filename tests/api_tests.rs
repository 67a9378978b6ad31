// tests/api_tests.rs

use std::str::FromStr;
use std::sync::Arc;

use examina::{config::Config, routes, state::AppState, store::SqliteStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
///
/// Each call gets its own throwaway SQLite database file under the
/// system temp directory.
async fn spawn_app() -> String {
    let db_path = std::env::temp_dir().join(format!("examina_test_{}.db", uuid::Uuid::new_v4()));
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    // 1. Create a pool
    let connect_options = SqliteConnectOptions::from_str(&database_url)
        .expect("Invalid test database URL")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
        .expect("Failed to open test database");

    // 2. Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    // 3. Create test configuration and state
    let config = Config {
        database_url: database_url.clone(),
        bind_addr: "127.0.0.1:0".to_string(),
        rust_log: "error".to_string(),
        cors_origin: "http://localhost:3000".to_string(),
    };

    let state = AppState::new(Arc::new(SqliteStore::new(pool)), config);

    // 4. Create the router with the app state
    let app = routes::create_router(state);

    // 5. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 6. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn exam_body(number_of_questions: i64, examination_minutes: i64) -> serde_json::Value {
    serde_json::json!({
        "exam_term": "Summer 2025",
        "course_name": "Operating Systems",
        "exam_date": "2025-06-20",
        "number_of_questions": number_of_questions,
        "examination_minutes": examination_minutes,
        "start_time": "09:00:00"
    })
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn create_exam_works() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(&format!("{}/api/exams", address))
        .json(&exam_body(10, 30))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let exam: serde_json::Value = response.json().await.unwrap();
    assert!(exam["id"].as_i64().unwrap() > 0);
    assert_eq!(exam["is_completed"], false);
    assert_eq!(exam["completed_at"], serde_json::Value::Null);
}

#[tokio::test]
async fn create_exam_fails_validation() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: question count and duration out of bounds, blank course name
    for body in [
        exam_body(0, 30),
        exam_body(101, 30),
        exam_body(10, 0),
        exam_body(10, 481),
        serde_json::json!({
            "exam_term": "Summer 2025",
            "course_name": "",
            "exam_date": "2025-06-20",
            "number_of_questions": 10,
            "examination_minutes": 30,
            "start_time": "09:00:00"
        }),
    ] {
        let response = client
            .post(&format!("{}/api/exams", address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");

        // Assert
        assert_eq!(response.status().as_u16(), 400);
    }
}

#[tokio::test]
async fn get_missing_exam_is_404() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/api/exams/9999", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn enrollment_assigns_sequential_exam_order() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let exam: serde_json::Value = client
        .post(&format!("{}/api/exams", address))
        .json(&exam_body(10, 30))
        .send()
        .await
        .expect("Failed to create exam")
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();

    // Act
    for (ident, name) in [("s001", "Anna"), ("s002", "Bjarke"), ("s003", "Clara")] {
        let response = client
            .post(&format!("{}/api/exams/{}/students", address, exam_id))
            .json(&serde_json::json!({ "student_ident": ident, "name": name }))
            .send()
            .await
            .expect("Failed to enroll student");
        assert_eq!(response.status().as_u16(), 201);
    }

    // Assert
    let students: Vec<serde_json::Value> = client
        .get(&format!("{}/api/exams/{}/students", address, exam_id))
        .send()
        .await
        .expect("Failed to list students")
        .json()
        .await
        .unwrap();

    let orders: Vec<i64> = students.iter().map(|s| s["exam_order"].as_i64().unwrap()).collect();
    assert_eq!(orders, vec![1, 2, 3]);
}

#[tokio::test]
async fn enroll_on_missing_exam_is_404() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(&format!("{}/api/exams/4242/students", address))
        .json(&serde_json::json!({ "student_ident": "s001", "name": "Anna" }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn enroll_fails_validation_on_blank_fields() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let exam: serde_json::Value = client
        .post(&format!("{}/api/exams", address))
        .json(&exam_body(10, 30))
        .send()
        .await
        .expect("Failed to create exam")
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();

    // Act
    let response = client
        .post(&format!("{}/api/exams/{}/students", address, exam_id))
        .json(&serde_json::json!({ "student_ident": "", "name": "Anna" }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn summary_of_untouched_exam_is_empty() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let exam: serde_json::Value = client
        .post(&format!("{}/api/exams", address))
        .json(&exam_body(10, 30))
        .send()
        .await
        .expect("Failed to create exam")
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();

    // Act
    let summary: serde_json::Value = client
        .get(&format!("{}/api/exams/{}/summary", address, exam_id))
        .send()
        .await
        .expect("Failed to fetch summary")
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(summary["results_total"], 0);
    assert_eq!(summary["average_grade"], serde_json::Value::Null);
    assert_eq!(summary["completion_rate"], 0);
    let buckets = summary["grade_distribution"].as_array().unwrap();
    assert_eq!(buckets.len(), 6);
    assert!(buckets.iter().all(|b| b["count"] == 0));
}
