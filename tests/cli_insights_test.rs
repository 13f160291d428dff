//! Integration tests for insights, Ollama and config commands via CLI.
//!
//! A minimal HTTP responder stands in for the Ollama server so these tests
//! never depend on a real model being installed.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

/// Serve `/api/tags` and `/api/chat` with canned bodies until `connections`
/// requests have been answered.
fn fake_ollama(tags: &'static str, chat_status: &'static str, chat: &'static str, connections: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    thread::spawn(move || {
        for stream in listener.incoming().take(connections) {
            let stream = stream.unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let (status, payload) = if request_line.contains("/api/chat") {
                (chat_status, chat)
            } else {
                ("200 OK", tags)
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                payload.len(),
                payload
            );
            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
        }
    });

    url
}

// === Insights ===

#[test]
fn test_insights_ollama_unreachable() {
    let env = TestEnv::new();
    env.create_task("Une tâche");

    env.tm()
        .args(["insights"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ollama n'est pas accessible"));
}

#[test]
fn test_insights_no_tasks() {
    let env = TestEnv::new();
    let url = fake_ollama(r#"{"models":[{"name":"llama3.1"}]}"#, "200 OK", "{}", 1);

    env.tm()
        .args(["insights", "--ollama-url", &url])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Aucune tâche trouvée"));
}

#[test]
fn test_insights_success() {
    let env = TestEnv::new();
    env.create_task("Écrire le rapport");
    let url = fake_ollama(
        r#"{"models":[{"name":"llama3.1"}]}"#,
        "200 OK",
        r#"{"message":{"role":"assistant","content":"Priorisez le rapport."}}"#,
        3,
    );

    let output = env.tm().args(["insights", "--ollama-url", &url]).output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["analysis"], "Priorisez le rapport.");
    assert_eq!(report["model_used"], "llama3.1");
    assert_eq!(report["stats"]["total"], 1);
}

#[test]
fn test_insights_fallback_model_notice() {
    let env = TestEnv::new();
    env.create_task("Écrire le rapport");
    let url = fake_ollama(
        r#"{"models":[{"name":"mistral:latest"}]}"#,
        "200 OK",
        r#"{"message":{"role":"assistant","content":"Analyse."}}"#,
        3,
    );

    let report: serde_json::Value = {
        let output = env.tm().args(["insights", "--ollama-url", &url]).output().unwrap();
        assert!(output.status.success(), "{:?}", output);
        serde_json::from_slice(&output.stdout).unwrap()
    };
    assert_eq!(report["model_used"], "mistral:latest");
    assert!(report["notice"].as_str().unwrap().contains("llama3.1"));
}

#[test]
fn test_insights_model_not_found_degrades() {
    let env = TestEnv::new();
    env.create_task("Écrire le rapport");
    let url = fake_ollama(
        r#"{"models":[{"name":"llama3.1"}]}"#,
        "404 Not Found",
        r#"{"error":"model \"llama3.1\" not found, try pulling it first"}"#,
        3,
    );

    env.tm()
        .args(["insights", "--ollama-url", &url, "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Erreur lors de la génération des insights"))
        .stdout(predicate::str::contains("ollama pull llama3.1"))
        .stdout(predicate::str::contains("Modèle: N/A"));
}

// === Ollama ===

#[test]
fn test_ollama_status_unreachable() {
    let env = TestEnv::new();

    let status = env.json(&["ollama", "status"]);
    assert_eq!(status["reachable"], false);
    assert_eq!(status["models"].as_array().unwrap().len(), 0);
    assert!(status["selection"].is_null());
}

#[test]
fn test_ollama_status_lists_models() {
    let env = TestEnv::new();
    let url = fake_ollama(r#"{"models":[{"name":"phi3:mini"}]}"#, "200 OK", "{}", 2);

    let status = env.json(&["ollama", "status", "--ollama-url", &url]);
    assert_eq!(status["reachable"], true);
    assert_eq!(status["models"][0], "phi3:mini");
    assert_eq!(status["preferred_installed"], false);
    assert_eq!(status["selection"]["model"], "phi3:mini");
    assert_eq!(status["selection"]["fallback"], "first_available");
}

#[test]
fn test_ollama_test_without_server_fails() {
    let env = TestEnv::new();

    env.tm()
        .args(["ollama", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Aucun modèle Ollama n'est disponible"));
}

// === Config ===

#[test]
fn test_config_show_defaults() {
    let env = TestEnv::new();

    let config = env.json(&["config", "show"]);
    assert_eq!(config["ollama_model"]["value"], "llama3.1");
    assert_eq!(config["ollama_model"]["source"], "default");
    assert_eq!(config["ollama_url"]["source"], "env:TM_OLLAMA_URL");
    assert_eq!(config["port"]["value"], 8000);
}

#[test]
fn test_config_show_reads_file_and_flags() {
    let env = TestEnv::new();
    std::fs::write(
        env.config_path().join("config.kdl"),
        "ollama-model \"mistral\"\nport 9000\nnum-predict 200\n",
    )
    .unwrap();

    let config = env.json(&["config", "show"]);
    assert_eq!(config["ollama_model"]["value"], "mistral");
    assert_eq!(config["ollama_model"]["source"], "config");
    assert_eq!(config["num_predict"]["value"], 200);

    let config = env.json(&["config", "show", "--model", "llama3"]);
    assert_eq!(config["ollama_model"]["value"], "llama3");
    assert_eq!(config["ollama_model"]["source"], "cli");
}

#[test]
fn test_config_show_invalid_file_fails() {
    let env = TestEnv::new();
    std::fs::write(env.config_path().join("config.kdl"), "temperature 5.0\n").unwrap();

    env.tm()
        .args(["config", "show", "-H"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("temperature must be"));
}

#[test]
fn test_config_show_out_of_range_file_value_fails() {
    let env = TestEnv::new();
    std::fs::write(env.config_path().join("config.kdl"), "port 70000\n").unwrap();

    env.tm()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("port is out of range"));
}

#[test]
fn test_invalid_ollama_url_flag_fails_before_any_request() {
    let env = TestEnv::new();
    env.create_task("Une tâche");

    env.tm()
        .args(["insights", "--ollama-url", "localhost:11434"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ollama-url must start with http://"))
        .stderr(predicate::str::contains("Ollama n'est pas accessible").not());
}
